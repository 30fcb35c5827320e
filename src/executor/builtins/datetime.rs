//! DateTime builtin functions. All times are UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::ast::FunctionExpression;
use crate::coerce;
use crate::error::{SqlError, SqlResult};
use crate::executor::evaluate::Evaluator;
use crate::executor::row::EvalContext;
use crate::value::Value;

use super::{check_args, check_args_range, evaluate_args};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// FROM_UNIXTIME output: hour without a leading zero
const UNIXTIME_FORMAT: &str = "%Y-%m-%d %-H:%M:%S";

/// Wall clock shifted by the configured offset.
fn now(ev: &Evaluator<'_>) -> SqlResult<DateTime<Utc>> {
    let offset = ev.config().clock_offset_seconds;
    TimeDelta::try_seconds(offset)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| SqlError::runtime(format!("Clock offset {} is out of range", offset)))
}

/// Parse `YYYY-MM-DD[ HH:MM:SS]` as a UTC timestamp.
fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Call a datetime function. Returns None if function not found.
pub fn call(
    ev: &Evaluator<'_>,
    func: &FunctionExpression,
    ctx: &EvalContext<'_>,
) -> SqlResult<Option<Value>> {
    let result = match func.name.as_str() {
        "NOW" => {
            check_args(func, 0)?;
            Value::String(now(ev)?.format(DATETIME_FORMAT).to_string())
        }

        "FROM_UNIXTIME" => {
            check_args(func, 1)?;
            let args = evaluate_args(ev, func, ctx)?;
            if args[0].is_null() {
                Value::Null
            } else {
                DateTime::from_timestamp(coerce::to_int(&args[0]), 0)
                    .map(|dt| Value::String(dt.format(UNIXTIME_FORMAT).to_string()))
                    .unwrap_or_default()
            }
        }

        "UNIX_TIMESTAMP" => {
            check_args_range(func, 0, 1)?;
            let args = evaluate_args(ev, func, ctx)?;
            match args.first() {
                None => Value::Int(now(ev)?.timestamp()),
                Some(Value::Null) => Value::Null,
                Some(Value::String(s)) => parse_timestamp(s).map(Value::Int).unwrap_or_default(),
                Some(other) => Value::Int(coerce::to_int(other)),
            }
        }

        _ => return Ok(None),
    };
    Ok(Some(result))
}
