//! Deterministic bucket assignment, carried from the teacher's
//! `evaluator.rs::bucket()` and generalized to an arbitrary `bucket_by`
//! attribute and an optional secondary key (spec.md §4.2).

use hex::ToHex;
use sha1::{Digest, Sha1};
use std::ops::Div;

const BUCKET_DIVIDER: f64 = 0xFFFFFFFFFFFFFFFu64 as f64;

/// Computes a deterministic bucket in `[0, 1)` for `(key, salt, attr_value)`,
/// optionally mixing in a secondary identifier.
///
/// This is a compatibility surface: the procedure must match bit-for-bit
/// across SDK implementations, so no part of it may be altered without
/// breaking cross-SDK rollout consistency.
pub fn bucket(key: &str, salt: &str, attr_value: &str, secondary: Option<&str>) -> f64 {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(b".");
    hasher.update(salt.as_bytes());
    hasher.update(b".");
    hasher.update(attr_value.as_bytes());
    if let Some(secondary) = secondary {
        hasher.update(b".");
        hasher.update(secondary.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex: String = digest.encode_hex();
    hex.truncate(15);
    // Safe to unwrap: 15 hex chars are always valid input to from_str_radix
    // and always fit in a u64 (60 bits).
    let val = u64::from_str_radix(&hex, 16).unwrap() as f64;
    val.div(BUCKET_DIVIDER)
}
