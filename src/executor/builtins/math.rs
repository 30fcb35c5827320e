//! Math builtin functions.

use std::cmp::Ordering;

use crate::ast::FunctionExpression;
use crate::coerce::{self, Numeric};
use crate::error::{SqlError, SqlResult};
use crate::executor::evaluate::Evaluator;
use crate::executor::row::EvalContext;
use crate::value::Value;

use super::{check_args, check_args_range, check_min_args, evaluate_args};

/// Integer remainder with both operands truncated; NULL on a zero divisor.
pub(crate) fn modulo(left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    let divisor = coerce::to_int(right);
    if divisor == 0 {
        return Value::Null;
    }
    // i64::MIN % -1 overflows; the remainder is 0
    Value::Int(coerce::to_int(left).checked_rem(divisor).unwrap_or(0))
}

/// Whole-number float results come back as integers when they fit.
fn integral(f: f64) -> Value {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn round(value: Numeric, digits: i64) -> Value {
    let digits = digits.clamp(-30, 30) as i32;
    match value {
        Numeric::Int(i) if digits >= 0 => Value::Int(i),
        Numeric::Int(i) => {
            let factor = 10f64.powi(-digits);
            integral((i as f64 / factor).round() * factor)
        }
        Numeric::Float(f) if digits == 0 => integral(f.round()),
        Numeric::Float(f) => {
            let factor = 10f64.powi(digits);
            Value::Float((f * factor).round() / factor)
        }
    }
}

/// Call a math function. Returns None if function not found.
pub fn call(
    ev: &Evaluator<'_>,
    func: &FunctionExpression,
    ctx: &EvalContext<'_>,
) -> SqlResult<Option<Value>> {
    let name = func.name.as_str();
    match name {
        "MOD" => check_args(func, 2)?,
        "ABS" | "CEIL" | "CEILING" | "FLOOR" => check_args(func, 1)?,
        "ROUND" => check_args_range(func, 1, 2)?,
        "GREATEST" | "LEAST" => check_min_args(func, 2)?,
        _ => return Ok(None),
    }
    let args = evaluate_args(ev, func, ctx)?;

    if name == "MOD" {
        return Ok(Some(modulo(&args[0], &args[1])));
    }
    if args.iter().any(Value::is_null) {
        return Ok(Some(Value::Null));
    }

    let result = match name {
        "ABS" => match coerce::to_numeric(&args[0]) {
            Some(Numeric::Int(i)) => Value::Int(i.checked_abs().ok_or_else(|| {
                SqlError::runtime(format!("BIGINT value is out of range in 'abs({})'", i))
            })?),
            Some(Numeric::Float(f)) => Value::Float(f.abs()),
            None => Value::Null,
        },

        "CEIL" | "CEILING" => match coerce::to_numeric(&args[0]) {
            Some(Numeric::Float(f)) => integral(f.ceil()),
            other => other.map_or(Value::Null, Numeric::into_value),
        },

        "FLOOR" => match coerce::to_numeric(&args[0]) {
            Some(Numeric::Float(f)) => integral(f.floor()),
            other => other.map_or(Value::Null, Numeric::into_value),
        },

        "ROUND" => {
            let digits = args.get(1).map_or(0, coerce::to_int);
            match coerce::to_numeric(&args[0]) {
                Some(n) => round(n, digits),
                None => Value::Null,
            }
        }

        "GREATEST" | "LEAST" => {
            let wanted = if name == "GREATEST" {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best = &args[0];
            for candidate in &args[1..] {
                if coerce::compare(candidate, best) == Some(wanted) {
                    best = candidate;
                }
            }
            best.clone()
        }

        _ => return Ok(None),
    };
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval, try_eval};
    use super::*;

    #[test]
    fn test_mod() {
        assert_eq!(eval("MOD(10, 3)"), Value::Int(1));
        assert_eq!(eval("MOD(10.9, 3)"), Value::Int(1));
        assert_eq!(eval("MOD(10, 0)"), Value::Null);
        assert_eq!(eval("MOD(NULL, 3)"), Value::Null);
        assert_eq!(modulo(&Value::Int(i64::MIN), &Value::Int(-1)), Value::Int(0));
    }

    #[test]
    fn test_abs() {
        assert_eq!(eval("ABS(-3)"), Value::Int(3));
        assert_eq!(eval("ABS(-2.5)"), Value::Float(2.5));
        assert_eq!(eval("ABS(NULL)"), Value::Null);
        assert!(try_eval("ABS(-9223372036854775807 - 1)").is_err());
    }

    #[test]
    fn test_ceil_floor() {
        assert_eq!(eval("CEIL(1.2)"), Value::Int(2));
        assert_eq!(eval("CEILING(-1.2)"), Value::Int(-1));
        assert_eq!(eval("FLOOR(1.8)"), Value::Int(1));
        assert_eq!(eval("FLOOR(7)"), Value::Int(7));
    }

    #[test]
    fn test_round() {
        assert_eq!(eval("ROUND(2.5)"), Value::Int(3));
        assert_eq!(eval("ROUND(-2.5)"), Value::Int(-3));
        assert_eq!(eval("ROUND(1.23456, 2)"), Value::Float(1.23));
        assert_eq!(eval("ROUND(1234, -2)"), Value::Int(1200));
        assert_eq!(eval("ROUND(7)"), Value::Int(7));
    }

    #[test]
    fn test_greatest_least() {
        assert_eq!(eval("GREATEST(1, 5, 3)"), Value::Int(5));
        assert_eq!(eval("LEAST(4, 2, 8)"), Value::Int(2));
        assert_eq!(eval("GREATEST('apple', 'banana')"), Value::from("banana"));
        assert_eq!(eval("GREATEST(1, NULL, 3)"), Value::Null);
        assert_eq!(eval("LEAST(2, 1.5)"), Value::Float(1.5));
    }
}
