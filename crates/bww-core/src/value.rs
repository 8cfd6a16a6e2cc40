//! Dynamically typed values held by the reactive store.
//!
//! # Design
//!
//! [`Value`] models the handful of shapes a UI state slot can take: scalars,
//! text, and immutable composites. Composites live behind `Rc`, so cloning a
//! value is always cheap and "replacing" a list means building a new one.
//!
//! Two notions of equality exist:
//!
//! - [`Value::strict_eq`] is the store's change gate. Scalars compare by
//!   value (`NaN` never equals itself, `0` equals `-0`), composites compare by
//!   reference. Writing a freshly built list with identical contents is a
//!   change.
//! - `PartialEq` is structural and exists for assertions and diagnostics.
//!
//! String conversion ([`Display`](std::fmt::Display)), truthiness
//! ([`Value::is_truthy`]) and [`parse_float`] follow the conventions UI
//! markup expects, so element injection and extraction round-trip with
//! pre-existing pages.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

/// Largest integer magnitude that an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A state value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// The absent sentinel: returned for keys that were never defined.
    #[default]
    Undefined,
    /// An explicit empty value.
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Immutable list, compared by reference in [`Value::strict_eq`].
    List(Rc<[Value]>),
    /// Immutable ordered map, compared by reference in [`Value::strict_eq`].
    Map(Rc<IndexMap<String, Value>>),
}

impl Value {
    /// Build a list value.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Build a map value, preserving insertion order.
    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Identity comparison used to gate change notification.
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Truthiness: `undefined`, `null`, `false`, `0`, `NaN` and `""` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::List(_) | Self::Map(_) => true,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type label for logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

// ---------------------------------------------------------------------------
// String conversion
// ---------------------------------------------------------------------------

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    // Holes and nulls join as empty strings.
                    if !matches!(item, Self::Undefined | Self::Null) {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Map(_) => f.write_str("[object Object]"),
        }
    }
}

/// Format a number the way UI markup prints it: `25` rather than `25.0`,
/// exponent form outside `[1e-6, 1e21)`.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{n}");
    }
    let exp = format!("{n:e}");
    match exp.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exp,
    }
}

/// Parse the longest numeric prefix of `input`, ignoring leading whitespace.
///
/// Returns `None` when no prefix is numeric (`"abc"`, `""`, `"."`). Trailing
/// garbage is ignored: `"12px"` parses as `12`.
#[must_use]
pub fn parse_float(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut pos = 0;

    let negative = match bytes.first() {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    if s[pos..].starts_with("Infinity") {
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_digits = &s[int_start..pos];

    let mut frac_digits = "";
    if pos < bytes.len() && bytes[pos] == b'.' {
        let frac_start = pos + 1;
        let mut end = frac_start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        frac_digits = &s[frac_start..end];
        if !int_digits.is_empty() || !frac_digits.is_empty() {
            pos = end;
        }
    }

    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let mut exponent = "";
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut end = pos + 1;
        if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
            end += 1;
        }
        let digits_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end > digits_start {
            exponent = &s[pos + 1..end];
        }
    }

    let int_part = if int_digits.is_empty() { "0" } else { int_digits };
    let frac_part = if frac_digits.is_empty() { "0" } else { frac_digits };
    let sign = if negative { "-" } else { "" };
    let normalized = if exponent.is_empty() {
        format!("{sign}{int_part}.{frac_part}")
    } else {
        format!("{sign}{int_part}.{frac_part}e{exponent}")
    };
    normalized.parse().ok()
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => {
                if !n.is_finite() {
                    serializer.serialize_unit()
                } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Self::Text(s) => serializer.serialize_str(s),
            Self::List(items) => serializer.collect_seq(items.iter()),
            Self::Map(entries) => {
                serializer.collect_map(entries.iter().filter(|(_, v)| !v.is_undefined()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strict_eq_scalars_by_value() {
        assert!(Value::from(5).strict_eq(&Value::from(5.0)));
        assert!(Value::from("a").strict_eq(&Value::from("a")));
        assert!(!Value::from("5").strict_eq(&Value::from(5)));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
        assert!(Value::from(0.0).strict_eq(&Value::from(-0.0)));
    }

    #[test]
    fn strict_eq_nan_is_never_equal() {
        let nan = Value::from(f64::NAN);
        assert!(!nan.strict_eq(&nan.clone()));
    }

    #[test]
    fn strict_eq_composites_by_reference() {
        let a = Value::list([Value::from(1), Value::from(2)]);
        let b = Value::list([Value::from(1), Value::from(2)]);
        assert!(!a.strict_eq(&b));
        assert!(a.strict_eq(&a.clone()));
        // Structural equality still holds.
        assert_eq!(a, b);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::from(-1).is_truthy());
        assert!(Value::list([]).is_truthy());
    }

    #[test]
    fn display_matches_markup_conventions() {
        assert_eq!(Value::from(25).to_string(), "25");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(-0.0).to_string(), "0");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::list([Value::from(1), Value::Null, Value::from("x")]).to_string(),
            "1,,x"
        );
        assert_eq!(Value::map([("a", Value::from(1))]).to_string(), "[object Object]");
    }

    #[test]
    fn format_number_exponent_ranges() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(0.000_001), "0.000001");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn parse_float_prefixes() {
        assert_eq!(parse_float("42"), Some(42.0));
        assert_eq!(parse_float("  3.5kg"), Some(3.5));
        assert_eq!(parse_float("-.5"), Some(-0.5));
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float("1.e2"), Some(100.0));
        assert_eq!(parse_float("2e"), Some(2.0));
        assert_eq!(parse_float("12px"), Some(12.0));
        assert_eq!(parse_float("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_float(""), None);
        assert_eq!(parse_float("."), None);
        assert_eq!(parse_float("abc"), None);
        assert_eq!(parse_float("-"), None);
    }

    #[test]
    fn serialize_numbers_and_undefined() {
        let value = Value::map([
            ("age", Value::from(25)),
            ("ratio", Value::from(0.5)),
            ("missing", Value::Undefined),
            ("bad", Value::from(f64::NAN)),
            ("tags", Value::list([Value::from("a"), Value::Undefined])),
        ]);
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(
            json,
            r#"{"age":25,"ratio":0.5,"bad":null,"tags":["a",null]}"#
        );
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    proptest! {
        #[test]
        fn parse_float_reads_back_formatted_integers(n in -1_000_000i32..1_000_000) {
            let text = Value::from(n).to_string();
            prop_assert_eq!(parse_float(&text), Some(f64::from(n)));
        }

        #[test]
        fn strict_eq_is_reflexive_for_non_nan(n in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
            let v = Value::from(n);
            prop_assert!(v.strict_eq(&v.clone()));
        }
    }
}
