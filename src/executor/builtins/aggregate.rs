//! Aggregate functions: COUNT, SUM, MIN, MAX, AVG.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::ast::{Expression, FunctionExpression};
use crate::coerce::{self, Numeric};
use crate::error::{SqlError, SqlResult};
use crate::executor::evaluate::Evaluator;
use crate::executor::row::EvalContext;
use crate::value::Value;

use super::check_args;

pub fn call(ev: &Evaluator<'_>, func: &FunctionExpression, ctx: &EvalContext<'_>) -> SqlResult<Value> {
    let group = ctx
        .group_rows()
        .ok_or_else(|| SqlError::runtime("Invalid use of group function"))?;
    check_args(func, 1)?;
    let arg = &func.args[0];

    if let Expression::Wildcard { .. } = arg {
        if func.name == "COUNT" && !func.distinct {
            return Ok(Value::Int(group.len() as i64));
        }
        return Err(SqlError::runtime(format!("{}(*) is not supported", func.name)));
    }

    // Non-NULL argument values, one per member row
    let mut values = Vec::with_capacity(group.len());
    for row in group {
        let value = ev.evaluate(arg, &ctx.member(row))?;
        if !value.is_null() {
            values.push(value);
        }
    }

    let result = match func.name.as_str() {
        "COUNT" if func.distinct => {
            // only integer and string values are bucketed
            let buckets: HashSet<String> = values
                .iter()
                .filter(|v| matches!(v, Value::Int(_) | Value::String(_)))
                .map(coerce::to_text)
                .collect();
            Value::Int(buckets.len() as i64)
        }
        "COUNT" => Value::Int(values.len() as i64),
        "SUM" => sum(&values),
        "MIN" => extreme(values, Ordering::Less),
        "MAX" => extreme(values, Ordering::Greater),
        "AVG" => {
            if values.is_empty() {
                Value::Null
            } else {
                let total: f64 = values.iter().map(coerce::to_float).sum();
                Value::Float(total / values.len() as f64)
            }
        }
        other => return Err(SqlError::runtime(format!("Function {} not implemented", other))),
    };
    Ok(result)
}

/// Integer sum until the first float operand or overflow, then float.
fn sum(values: &[Value]) -> Value {
    let mut acc = Numeric::Int(0);
    for value in values {
        let Some(n) = coerce::to_numeric(value) else {
            continue;
        };
        acc = match (acc, n) {
            (Numeric::Int(a), Numeric::Int(b)) => match a.checked_add(b) {
                Some(total) => Numeric::Int(total),
                None => Numeric::Float(a as f64 + b as f64),
            },
            (a, b) => Numeric::Float(a.as_f64() + b.as_f64()),
        };
    }
    acc.into_value()
}

/// The first value that no other value beats in direction `wanted`.
fn extreme(values: Vec<Value>, wanted: Ordering) -> Value {
    let mut best: Option<Value> = None;
    for value in values {
        best = match best {
            Some(current) if coerce::compare(&value, &current) != Some(wanted) => Some(current),
            _ => Some(value),
        };
    }
    best.unwrap_or_default()
}
