//! Binary predicates over `(user_value, clause_value)`, ported from
//! `original_source/src/ldoperator.c`'s operator table (spec.md §4.3).

use crate::value::Value;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The comparison operator named by a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "in")]
    In,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "matches")]
    Matches,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "lessThan")]
    LessThan,
    #[serde(rename = "lessThanOrEqual")]
    LessThanOrEqual,
    #[serde(rename = "greaterThan")]
    GreaterThan,
    #[serde(rename = "greaterThanOrEqual")]
    GreaterThanOrEqual,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "after")]
    After,
    #[serde(rename = "segmentMatch")]
    SegmentMatch,
}

/// Evaluates `uvalue OP cvalue`.
///
/// A type mismatch between operands yields `false` without error, as does
/// any runtime failure (regex compile, date parse) — both are treated as a
/// non-match at the predicate level, never a top-level failure (spec.md §7).
///
/// `SegmentMatch` is handled one level up in [`crate::clause`], since it
/// needs store access this function deliberately doesn't have.
pub fn evaluate(op: Operator, uvalue: &Value, cvalue: &Value) -> bool {
    match op {
        Operator::In => uvalue == cvalue,
        Operator::StartsWith => strings(uvalue, cvalue, |u, c| u.starts_with(c)),
        Operator::EndsWith => strings(uvalue, cvalue, |u, c| u.ends_with(c)),
        Operator::Contains => strings(uvalue, cvalue, |u, c| u.contains(c)),
        Operator::Matches => strings(uvalue, cvalue, |u, c| {
            Regex::new(c).map(|re| re.is_match(u)).unwrap_or(false)
        }),
        Operator::LessThan => numbers(uvalue, cvalue, |u, c| u < c),
        Operator::LessThanOrEqual => numbers(uvalue, cvalue, |u, c| u <= c),
        Operator::GreaterThan => numbers(uvalue, cvalue, |u, c| u > c),
        Operator::GreaterThanOrEqual => numbers(uvalue, cvalue, |u, c| u >= c),
        Operator::Before => compare_time(uvalue, cvalue, |u, c| u < c),
        Operator::After => compare_time(uvalue, cvalue, |u, c| u > c),
        Operator::SegmentMatch => false,
    }
}

fn strings(uvalue: &Value, cvalue: &Value, f: impl Fn(&str, &str) -> bool) -> bool {
    match (uvalue.as_str(), cvalue.as_str()) {
        (Some(u), Some(c)) => f(u, c),
        _ => false,
    }
}

fn numbers(uvalue: &Value, cvalue: &Value, f: impl Fn(f64, f64) -> bool) -> bool {
    match (uvalue.as_f64(), cvalue.as_f64()) {
        (Some(u), Some(c)) => f(u, c),
        _ => false,
    }
}

/// Parses a strict RFC 3339 instant, returning `None` on empty text or a
/// parse failure (resolving spec.md §9's open question about
/// `strptime`-based parsing).
fn parse_instant(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    DateTime::<FixedOffset>::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn compare_time(uvalue: &Value, cvalue: &Value, f: impl Fn(f64, f64) -> bool) -> bool {
    match (uvalue, cvalue) {
        (Value::Number(u), Value::Number(c)) => f(*u, *c),
        (Value::Text(u), Value::Text(c)) => match (parse_instant(u), parse_instant(c)) {
            (Some(u), Some(c)) => f(u as f64, c as f64),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn in_is_deep_equality() {
        assert!(evaluate(Operator::In, &Value::Number(1.0), &Value::Number(1.0)));
        assert!(!evaluate(Operator::In, &Value::Number(1.0), &Value::Text("1".into())));
    }

    #[test]
    fn starts_ends_contains() {
        assert!(evaluate(Operator::StartsWith, &v("hello world"), &v("hello")));
        assert!(evaluate(Operator::EndsWith, &v("hello world"), &v("world")));
        assert!(evaluate(Operator::Contains, &v("hello world"), &v("lo wo")));
        assert!(!evaluate(Operator::StartsWith, &Value::Number(1.0), &v("1")));
    }

    #[test]
    fn matches_uses_regex_and_fails_closed_on_bad_pattern() {
        assert!(evaluate(Operator::Matches, &v("abc123"), &v("^[a-z]+[0-9]+$")));
        assert!(!evaluate(Operator::Matches, &v("abc123"), &v("(unterminated")));
    }

    #[test]
    fn numeric_comparisons_require_both_numbers() {
        assert!(evaluate(Operator::LessThan, &Value::Number(1.0), &Value::Number(2.0)));
        assert!(!evaluate(Operator::LessThan, &Value::Number(1.0), &v("2")));
    }

    #[test]
    fn before_after_numeric_unix_ms() {
        assert!(evaluate(Operator::Before, &Value::Number(1.0), &Value::Number(2.0)));
        assert!(evaluate(Operator::After, &Value::Number(2.0), &Value::Number(1.0)));
    }

    #[test]
    fn before_after_rfc3339_text() {
        assert!(evaluate(
            Operator::Before,
            &v("2020-01-01T00:00:00Z"),
            &v("2021-01-01T00:00:00Z")
        ));
        assert!(evaluate(
            Operator::After,
            &v("2021-06-01T00:00:00.500+02:00"),
            &v("2020-01-01T00:00:00Z")
        ));
    }

    #[test]
    fn empty_or_unparseable_dates_are_non_matches() {
        assert!(!evaluate(Operator::Before, &v(""), &v("2020-01-01T00:00:00Z")));
        assert!(!evaluate(Operator::Before, &v("not-a-date"), &v("2020-01-01T00:00:00Z")));
    }

    #[test]
    fn mixed_numeric_text_time_is_non_match() {
        assert!(!evaluate(Operator::Before, &Value::Number(1.0), &v("2020-01-01T00:00:00Z")));
    }
}
