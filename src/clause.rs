//! Clause matching against a user, per spec.md §4.4.

use crate::models::Clause;
use crate::operators::{self, Operator};
use crate::segment;
use crate::store::Store;
use crate::user::User;
use crate::value::Value;

/// Evaluates whether `clause` matches `user`.
///
/// `segmentMatch` clauses recurse through `store` to resolve named
/// segments; every other operator is a pure predicate from
/// [`crate::operators`].
pub fn matches(clause: &Clause, user: &User, store: &dyn Store) -> bool {
    let result = if clause.op == Operator::SegmentMatch {
        clause
            .values
            .iter()
            .filter_map(Value::as_str)
            .any(|segment_key| match store.get_segment(segment_key) {
                Some(seg) => segment::matches(&seg, user, store),
                None => false,
            })
    } else {
        match user.attribute(&clause.attribute) {
            None => false,
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| clause.values.iter().any(|cv| operators::evaluate(clause.op, item, cv))),
            Some(attr_value) => clause
                .values
                .iter()
                .any(|cv| operators::evaluate(clause.op, &attr_value, cv)),
        }
    };
    result ^ clause.negate
}
