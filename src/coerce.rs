//! MySQL casting and comparison rules.
//!
//! Every implicit conversion the evaluator performs goes through this module:
//! - numeric coercion of strings uses MySQL's leading-numeric-prefix rule
//!   (`'12abc'` is 12, `'abc'` is 0)
//! - comparisons return `None` when either side is NULL
//! - string-vs-string comparison is byte-exact; string-vs-number compares
//!   numerically; int-vs-float compares as floats

use std::cmp::Ordering;

use crate::value::Value;

/// A value after numeric coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Numeric::Int(i) => Value::Int(i),
            Numeric::Float(f) => Value::Float(f),
        }
    }
}

/// Parse the longest numeric prefix of `s`, after leading whitespace.
pub fn parse_numeric_prefix(s: &str) -> Numeric {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    let mut is_float = false;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        let frac_digits = frac_end - end - 1;
        if digits > 0 || frac_digits > 0 {
            digits += frac_digits;
            is_float = true;
            end = frac_end;
        }
    }

    if digits == 0 {
        return Numeric::Int(0);
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            is_float = true;
            end = exp_end;
        }
    }

    let prefix = &s[..end];
    if !is_float {
        if let Ok(i) = prefix.parse::<i64>() {
            return Numeric::Int(i);
        }
    }
    Numeric::Float(prefix.parse::<f64>().unwrap_or(0.0))
}

/// Numeric view of a value; `None` for NULL.
pub fn to_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(Numeric::Int(*b as i64)),
        Value::Int(i) => Some(Numeric::Int(*i)),
        Value::Float(f) => Some(Numeric::Float(*f)),
        Value::String(s) => Some(parse_numeric_prefix(s)),
    }
}

/// Integer cast with truncation toward zero. NULL casts to 0.
pub fn to_int(value: &Value) -> i64 {
    match to_numeric(value) {
        Some(Numeric::Int(i)) => i,
        Some(Numeric::Float(f)) => f.trunc() as i64,
        None => 0,
    }
}

/// Float cast. NULL casts to 0.0.
pub fn to_float(value: &Value) -> f64 {
    to_numeric(value).map(Numeric::as_f64).unwrap_or(0.0)
}

/// String cast. NULL casts to the empty string.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
    }
}

/// MySQL truthiness: non-NULL and numerically non-zero.
pub fn is_truthy(value: &Value) -> bool {
    match to_numeric(value) {
        Some(Numeric::Int(i)) => i != 0,
        Some(Numeric::Float(f)) => f != 0.0,
        None => false,
    }
}

fn compare_numeric(left: Numeric, right: Numeric) -> Ordering {
    match (left, right) {
        (Numeric::Int(a), Numeric::Int(b)) => a.cmp(&b),
        (a, b) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
    }
}

/// Compare two values; `None` when either side is NULL.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        _ => {
            let a = to_numeric(left)?;
            let b = to_numeric(right)?;
            Some(compare_numeric(a, b))
        }
    }
}

/// Loose equality (`=`); NULL never equals anything.
pub fn loose_equal(left: &Value, right: &Value) -> bool {
    compare(left, right) == Some(Ordering::Equal)
}

/// Identity: same type and same value.
pub fn strict_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => a == b,
        _ => left == right,
    }
}

/// Total order used by ORDER BY: NULL sorts before every other value.
pub fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
    }
}

/// Key used to bucket rows for GROUP BY and DISTINCT.
pub fn group_key(values: &[Value]) -> String {
    let mut key = String::new();
    for value in values {
        match value {
            Value::Null => key.push('N'),
            Value::Bool(b) => {
                key.push_str("I:");
                key.push_str(if *b { "1" } else { "0" });
            }
            Value::Int(i) => {
                key.push_str("I:");
                key.push_str(&i.to_string());
            }
            Value::Float(f) => {
                key.push_str("F:");
                key.push_str(&format!("{:?}", f));
            }
            Value::String(s) => {
                key.push_str("S:");
                key.push_str(s);
            }
        }
        key.push('\u{1f}');
    }
    key
}
