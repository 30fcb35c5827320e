//! Control-flow functions and the row-context readers VALUES and EXISTS.

use crate::ast::{Expression, FunctionExpression};
use crate::coerce;
use crate::error::{SqlError, SqlResult};
use crate::executor::evaluate::Evaluator;
use crate::executor::row::EvalContext;
use crate::value::Value;

use super::{check_args, check_min_args};

/// Call a control function. Returns None if function not found.
pub fn call(
    ev: &Evaluator<'_>,
    func: &FunctionExpression,
    ctx: &EvalContext<'_>,
) -> SqlResult<Option<Value>> {
    let args = &func.args;
    let result = match func.name.as_str() {
        "IF" => {
            check_args(func, 3)?;
            let condition = ev.evaluate(&args[0], ctx)?;
            let branch = if coerce::is_truthy(&condition) {
                &args[1]
            } else {
                &args[2]
            };
            Some(ev.evaluate(branch, ctx)?)
        }

        "IFNULL" | "COALESCE" => {
            check_min_args(func, 1)?;
            let mut found = Value::Null;
            for arg in args {
                let value = ev.evaluate(arg, ctx)?;
                if !value.is_null() {
                    found = value;
                    break;
                }
            }
            Some(found)
        }

        "NULLIF" => {
            check_args(func, 2)?;
            let first = ev.evaluate(&args[0], ctx)?;
            let second = ev.evaluate(&args[1], ctx)?;
            if coerce::strict_equal(&first, &second) {
                Some(Value::Null)
            } else {
                Some(first)
            }
        }

        "EXISTS" => {
            check_args(func, 1)?;
            let Expression::Subquery(query) = &args[0] else {
                return Err(SqlError::runtime("EXISTS requires a subquery"));
            };
            let result = ev.run_subquery(query, ctx)?;
            Some(Value::from_bool(!result.rows.is_empty()))
        }

        // Inside ON DUPLICATE KEY UPDATE: the value the INSERT proposed
        "VALUES" => {
            check_args(func, 1)?;
            let Expression::Column(column) = &args[0] else {
                return Err(SqlError::runtime("VALUES() argument must be a column name"));
            };
            Some(
                ctx.proposed
                    .and_then(|row| row.get(&column.name))
                    .cloned()
                    .unwrap_or_default(),
            )
        }

        _ => None,
    };
    Ok(result)
}
