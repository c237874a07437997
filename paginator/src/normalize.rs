//! Type coercion for heterogeneous comparable values.
//!
//! Items arriving from different sources disagree on representation: a timestamp may be a
//! `Value::Date` in one snapshot and an ISO-8601 string in the next, a count may be a number or a
//! numeric string. Every comparison in the sort and filter compilers goes through
//! [`normalize_compared_values`] so both operands land in the same comparable kind first.
use core::cmp::Ordering;

use chrono::DateTime;

use crate::Value;

/// Both operands of a comparison, coerced into one kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Comparable<'a> {
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Number(f64),
    Bool(bool),
    String(&'a str),
}

impl Comparable<'_> {
    fn cmp_same_kind(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Interprets `v` as a point in time (milliseconds since epoch).
///
/// Accepts `Value::Date` and RFC 3339 strings.
pub fn as_date_ms(v: &Value) -> Option<i64> {
    match v {
        Value::Date(d) => Some(d.timestamp_millis()),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|d| d.timestamp_millis()),
        _ => None,
    }
}

/// Interprets `v` as a finite number. Numeric strings are accepted.
pub fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => Some(*n),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Coerces both operands into a common comparable kind.
///
/// Returns `None` when the pair is incomparable: either side is null, or the kinds disagree after
/// coercion (e.g. a boolean against a date).
pub fn normalize_compared_values<'a>(
    a: &'a Value,
    b: &'a Value,
) -> Option<(Comparable<'a>, Comparable<'a>)> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (as_date_ms(a), as_date_ms(b)) {
        // Two plain strings that both happen to parse as dates still compare as dates.
        return Some((Comparable::Date(x), Comparable::Date(y)));
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return Some((Comparable::Number(x), Comparable::Number(y)));
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some((Comparable::Bool(*x), Comparable::Bool(*y))),
        (Value::String(x), Value::String(y)) => {
            Some((Comparable::String(x), Comparable::String(y)))
        }
        _ => None,
    }
}

/// Compares two comparable-normalized operands, `None` when incomparable.
pub fn compare_normalized(a: &Value, b: &Value) -> Option<Ordering> {
    normalize_compared_values(a, b).map(|(x, y)| x.cmp_same_kind(&y))
}

/// One value classified on its own, for ordering across kinds.
enum Ranked<'a> {
    Number(f64),
    Date(i64),
    Bool(bool),
    String(&'a str),
    Other(String),
    Null,
}

impl<'a> Ranked<'a> {
    fn of(v: &'a Value) -> Self {
        if let Some(ms) = as_date_ms(v) {
            return Self::Date(ms);
        }
        if let Some(n) = as_number(v) {
            return Self::Number(n);
        }
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::String(s) => Self::String(s),
            other => Self::Other(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Date(_) => 1,
            Self::Bool(_) => 2,
            Self::String(_) => 3,
            Self::Other(_) => 4,
            Self::Null => 5,
        }
    }
}

/// Ascending total comparison used by sort terms.
///
/// Each operand is classified on its own (a numeric string is a number, an RFC 3339 string a
/// date), so mixed fields still order transitively: numbers, then dates, booleans, strings,
/// other values by rendered form, and nulls last.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (x, y) = (Ranked::of(a), Ranked::of(b));
    match (&x, &y) {
        (Ranked::Number(p), Ranked::Number(q)) => p.total_cmp(q),
        (Ranked::Date(p), Ranked::Date(q)) => p.cmp(q),
        (Ranked::Bool(p), Ranked::Bool(q)) => p.cmp(q),
        (Ranked::String(p), Ranked::String(q)) => p.cmp(q),
        (Ranked::Other(p), Ranked::Other(q)) => p.cmp(q),
        _ => x.rank().cmp(&y.rank()),
    }
}

/// Scalar equality: normalized comparison first, identity equality for incomparable kinds.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_normalized(a, b) {
        Some(ord) => ord == Ordering::Equal,
        None => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits() || x == y,
            _ => a == b,
        },
    }
}

/// `true` when `haystack` holds a value equal to `needle`.
pub fn contains_value(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|v| values_equal(v, needle))
}

/// Set equality ignoring order and duplicates.
pub fn set_equal(a: &[Value], b: &[Value]) -> bool {
    a.iter().all(|v| contains_value(b, v)) && b.iter().all(|v| contains_value(a, v))
}
