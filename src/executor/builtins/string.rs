//! String builtin functions.
//!
//! Positions and lengths count characters, except LENGTH which counts bytes.
//! A NULL argument yields NULL unless noted otherwise.

use crate::ast::FunctionExpression;
use crate::coerce;
use crate::error::{SqlError, SqlResult};
use crate::executor::evaluate::Evaluator;
use crate::executor::row::EvalContext;
use crate::value::Value;

use super::{check_args, check_args_range, check_min_args, evaluate_args};

/// Call a string function. Returns None if function not found.
pub fn call(
    ev: &Evaluator<'_>,
    func: &FunctionExpression,
    ctx: &EvalContext<'_>,
) -> SqlResult<Option<Value>> {
    let name = func.name.as_str();
    match name {
        "SUBSTRING" | "SUBSTR" => check_args_range(func, 2, 3)?,
        "SUBSTRING_INDEX" | "REPLACE" => check_args(func, 3)?,
        "LENGTH" | "CHAR_LENGTH" | "CHARACTER_LENGTH" | "LOWER" | "UPPER" | "BINARY" | "TRIM"
        | "LTRIM" | "RTRIM" => check_args(func, 1)?,
        "CONCAT" | "CONCAT_WS" | "FIELD" => check_min_args(func, 2)?,
        _ => return Ok(None),
    }
    let args = evaluate_args(ev, func, ctx)?;

    let result = match name {
        "CONCAT_WS" => concat_ws(&args)?,

        "FIELD" => {
            let needle = &args[0];
            let position = if needle.is_null() {
                0
            } else {
                args[1..]
                    .iter()
                    .position(|candidate| coerce::loose_equal(needle, candidate))
                    .map_or(0, |i| i + 1)
            };
            Value::Int(position as i64)
        }

        "BINARY" => args[0].clone(),

        _ if args.iter().any(Value::is_null) => Value::Null,

        "SUBSTRING" | "SUBSTR" => {
            let length = args.get(2).map(coerce::to_int);
            Value::String(substring(&coerce::to_text(&args[0]), coerce::to_int(&args[1]), length))
        }

        "SUBSTRING_INDEX" => Value::String(substring_index(
            &coerce::to_text(&args[0]),
            &coerce::to_text(&args[1]),
            coerce::to_int(&args[2]),
        )),

        "LENGTH" => Value::Int(coerce::to_text(&args[0]).len() as i64),

        "CHAR_LENGTH" | "CHARACTER_LENGTH" => {
            Value::Int(coerce::to_text(&args[0]).chars().count() as i64)
        }

        "LOWER" => Value::String(coerce::to_text(&args[0]).to_lowercase()),

        "UPPER" => Value::String(coerce::to_text(&args[0]).to_uppercase()),

        "TRIM" => Value::String(coerce::to_text(&args[0]).trim_matches(' ').to_string()),

        "LTRIM" => Value::String(coerce::to_text(&args[0]).trim_start_matches(' ').to_string()),

        "RTRIM" => Value::String(coerce::to_text(&args[0]).trim_end_matches(' ').to_string()),

        "REPLACE" => {
            let haystack = coerce::to_text(&args[0]);
            let from = coerce::to_text(&args[1]);
            if from.is_empty() {
                Value::String(haystack)
            } else {
                Value::String(haystack.replace(&from, &coerce::to_text(&args[2])))
            }
        }

        "CONCAT" => Value::String(args.iter().map(coerce::to_text).collect()),

        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// MySQL SUBSTRING: 1-based, negative positions count from the end and
/// position 0 selects nothing.
fn substring(s: &str, pos: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len() as i64;

    let start = match pos {
        0 => return String::new(),
        p if p > 0 => p - 1,
        p => total + p,
    };
    if start < 0 || start >= total {
        return String::new();
    }

    let end = match length {
        Some(len) if len <= 0 => return String::new(),
        Some(len) => start.saturating_add(len).min(total),
        None => total,
    };
    chars[start as usize..end as usize].iter().collect()
}

/// Text before the `count`th delimiter, or after it counting from the right
/// when `count` is negative.
fn substring_index(s: &str, delimiter: &str, count: i64) -> String {
    if delimiter.is_empty() || count == 0 {
        return String::new();
    }
    let parts: Vec<&str> = s.split(delimiter).collect();
    let wanted = count.unsigned_abs().min(parts.len() as u64) as usize;
    if count > 0 {
        parts[..wanted].join(delimiter)
    } else {
        parts[parts.len() - wanted..].join(delimiter)
    }
}

/// Skips NULL arguments. A piece appended to an empty accumulator gets no
/// separator.
fn concat_ws(args: &[Value]) -> SqlResult<Value> {
    let separator = match &args[0] {
        Value::Null => {
            return Err(SqlError::runtime(
                "CONCAT_WS must be called with a non-NULL separator",
            ))
        }
        other => coerce::to_text(other),
    };

    let mut acc = String::new();
    for piece in args[1..].iter().filter(|v| !v.is_null()) {
        if !acc.is_empty() {
            acc.push_str(&separator);
        }
        acc.push_str(&coerce::to_text(piece));
    }
    Ok(Value::String(acc))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval, try_eval};
    use super::*;

    #[test]
    fn test_substring() {
        assert_eq!(eval("SUBSTRING('hello', 2)"), Value::from("ello"));
        assert_eq!(eval("SUBSTRING('hello', 2, 3)"), Value::from("ell"));
        assert_eq!(eval("SUBSTR('hello', -3)"), Value::from("llo"));
        assert_eq!(eval("SUBSTR('hello', -3, 2)"), Value::from("ll"));
        assert_eq!(eval("SUBSTRING('hello', 0)"), Value::from(""));
        assert_eq!(eval("SUBSTRING('hello', 9)"), Value::from(""));
        assert_eq!(eval("SUBSTRING('hello', 2, 0)"), Value::from(""));
        assert_eq!(eval("SUBSTRING('héllo', 2, 1)"), Value::from("é"));
        assert_eq!(eval("SUBSTRING(NULL, 1)"), Value::Null);
    }

    #[test]
    fn test_substring_index() {
        assert_eq!(eval("SUBSTRING_INDEX('a.b.c', '.', 2)"), Value::from("a.b"));
        assert_eq!(eval("SUBSTRING_INDEX('a.b.c', '.', -2)"), Value::from("b.c"));
        assert_eq!(eval("SUBSTRING_INDEX('a.b.c', '.', 5)"), Value::from("a.b.c"));
        assert_eq!(eval("SUBSTRING_INDEX('a.b.c', '.', 0)"), Value::from(""));
        assert_eq!(eval("SUBSTRING_INDEX('a::b', '::', 1)"), Value::from("a"));
    }

    #[test]
    fn test_lengths() {
        assert_eq!(eval("LENGTH('héllo')"), Value::Int(6));
        assert_eq!(eval("CHAR_LENGTH('héllo')"), Value::Int(5));
        assert_eq!(eval("CHARACTER_LENGTH('')"), Value::Int(0));
        assert_eq!(eval("LENGTH(12345)"), Value::Int(5));
        assert_eq!(eval("LENGTH(NULL)"), Value::Null);
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(eval("LOWER('MaRiO')"), Value::from("mario"));
        assert_eq!(eval("UPPER('luigi')"), Value::from("LUIGI"));
        assert_eq!(eval("TRIM('  x  ')"), Value::from("x"));
        assert_eq!(eval("LTRIM('  x  ')"), Value::from("x  "));
        assert_eq!(eval("RTRIM('  x  ')"), Value::from("  x"));
        assert_eq!(eval("UPPER(NULL)"), Value::Null);
    }

    #[test]
    fn test_concat() {
        assert_eq!(eval("CONCAT('a', 1, 'b')"), Value::from("a1b"));
        assert_eq!(eval("CONCAT('a', NULL)"), Value::Null);
    }

    #[test]
    fn test_concat_ws() {
        assert_eq!(eval("CONCAT_WS(',', 'a', NULL, 'b')"), Value::from("a,b"));
        assert_eq!(eval("CONCAT_WS('-', 1, 2, 3)"), Value::from("1-2-3"));
        assert_eq!(eval("CONCAT_WS(',', NULL, NULL)"), Value::from(""));
        assert_eq!(eval("CONCAT_WS(',', '', 'b')"), Value::from("b"));
        assert!(try_eval("CONCAT_WS(NULL, 'a')").unwrap_err().is_runtime_error());
    }

    #[test]
    fn test_field() {
        assert_eq!(eval("FIELD('b', 'a', 'b', 'c')"), Value::Int(2));
        assert_eq!(eval("FIELD('z', 'a', 'b')"), Value::Int(0));
        assert_eq!(eval("FIELD(2, '1', '2')"), Value::Int(2));
        assert_eq!(eval("FIELD(NULL, 'a', NULL)"), Value::Int(0));
    }

    #[test]
    fn test_binary_and_replace() {
        assert_eq!(eval("BINARY 'abc'"), Value::from("abc"));
        assert_eq!(eval("BINARY(NULL)"), Value::Null);
        assert_eq!(eval("REPLACE('a-b-c', '-', '+')"), Value::from("a+b+c"));
        assert_eq!(eval("REPLACE('abc', '', 'x')"), Value::from("abc"));
    }
}
