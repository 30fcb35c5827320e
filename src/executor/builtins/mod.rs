//! Builtin SQL functions.
//!
//! Functions receive their argument expressions unevaluated so that
//! aggregates can evaluate them once per group member and control functions
//! can skip branches they do not take.

mod aggregate;
mod control;
mod datetime;
mod math;
mod string;

use crate::ast::FunctionExpression;
use crate::error::{SqlError, SqlResult};
use crate::value::Value;

use super::evaluate::Evaluator;
use super::row::EvalContext;

pub(crate) use math::modulo;

/// Call a builtin function.
pub(crate) fn call(
    ev: &Evaluator<'_>,
    func: &FunctionExpression,
    ctx: &EvalContext<'_>,
) -> SqlResult<Value> {
    if func.is_aggregate() {
        return aggregate::call(ev, func, ctx);
    }

    // Scalar functions see the group through its representative row
    let ctx = ctx.unwrap_representative();

    if let Some(result) = control::call(ev, func, &ctx)? {
        return Ok(result);
    }

    if let Some(result) = string::call(ev, func, &ctx)? {
        return Ok(result);
    }

    if let Some(result) = math::call(ev, func, &ctx)? {
        return Ok(result);
    }

    if let Some(result) = datetime::call(ev, func, &ctx)? {
        return Ok(result);
    }

    Err(SqlError::runtime(format!(
        "Function {} not implemented",
        func.name
    )))
}

fn arity_error(func: &FunctionExpression, expected: &str) -> SqlError {
    SqlError::runtime(format!("{} must be called with {}", func.name, expected))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "argument"
    } else {
        "arguments"
    }
}

/// Check for exactly `n` arguments.
pub(super) fn check_args(func: &FunctionExpression, n: usize) -> SqlResult<()> {
    if func.args.len() != n {
        return Err(arity_error(func, &format!("{} {}", n, plural(n))));
    }
    Ok(())
}

/// Check for between `min` and `max` arguments.
pub(super) fn check_args_range(func: &FunctionExpression, min: usize, max: usize) -> SqlResult<()> {
    if func.args.len() < min || func.args.len() > max {
        return Err(arity_error(func, &format!("{} to {} arguments", min, max)));
    }
    Ok(())
}

/// Check for at least `min` arguments.
pub(super) fn check_min_args(func: &FunctionExpression, min: usize) -> SqlResult<()> {
    if func.args.len() < min {
        return Err(arity_error(func, &format!("at least {} {}", min, plural(min))));
    }
    Ok(())
}

/// Evaluate every argument in order.
pub(super) fn evaluate_args(
    ev: &Evaluator<'_>,
    func: &FunctionExpression,
    ctx: &EvalContext<'_>,
) -> SqlResult<Vec<Value>> {
    func.args.iter().map(|arg| ev.evaluate(arg, ctx)).collect()
}

#[cfg(test)]
pub(super) mod test_support {
    use crate::ast::Query;
    use crate::config::EngineConfig;
    use crate::error::SqlResult;
    use crate::executor::evaluate::Evaluator;
    use crate::executor::row::{EvalContext, Row};
    use crate::executor::InMemoryStore;
    use crate::parser::parse;
    use crate::value::Value;

    /// Evaluate a single select expression against an empty row.
    pub fn try_eval_with(expr: &str, config: &EngineConfig) -> SqlResult<Value> {
        let query = match parse(&format!("SELECT {}", expr))? {
            Query::Select(q) => q,
            other => panic!("unexpected statement {:?}", other),
        };
        let store = InMemoryStore::new();
        let evaluator = Evaluator::new(&store, config);
        let row = Row::new();
        evaluator.evaluate(&query.items[0].expression, &EvalContext::single(&row))
    }

    pub fn try_eval(expr: &str) -> SqlResult<Value> {
        try_eval_with(expr, &EngineConfig::default())
    }

    pub fn eval(expr: &str) -> Value {
        try_eval(expr).unwrap()
    }
}
