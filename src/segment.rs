//! Segment membership testing, per spec.md §4.4.

use crate::clause;
use crate::hasher;
use crate::models::Segment;
use crate::store::Store;
use crate::user::User;

/// Evaluates whether `user` is a member of `segment`.
///
/// Order: excluded, then included, then rules in order; the first matching
/// rule wins. A rule's optional rollout buckets on the segment's own
/// `key`/`salt`.
pub fn matches(segment: &Segment, user: &User, store: &dyn Store) -> bool {
    if segment.excluded.iter().any(|k| k == &user.key) {
        return false;
    }
    if segment.included.iter().any(|k| k == &user.key) {
        return true;
    }
    for rule in &segment.rules {
        if !rule.clauses.iter().all(|c| clause::matches(c, user, store)) {
            continue;
        }
        match &rule.rollout {
            None => return true,
            Some(rollout) => {
                let bucket_by = rollout.bucket_by.as_deref().unwrap_or("key");
                let attr = match user.attribute(bucket_by).and_then(|v| v.as_bucketable_text()) {
                    Some(a) => a,
                    None => continue,
                };
                let bucket = hasher::bucket(&segment.key, &segment.salt, &attr, user.secondary.as_deref());
                if bucket < (rollout.weight as f64 / 100_000.0) {
                    return true;
                }
            }
        }
    }
    false
}
