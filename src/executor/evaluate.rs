//! Expression evaluation.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use super::builtins;
use super::data_source::DataSource;
use super::row::{EvalContext, Row};
use super::select::SelectExecutor;
use super::ResultSet;
use crate::ast::{BinaryOperator, ColumnExpression, Expression, SelectQuery, UnaryOperator};
use crate::coerce::{self, Numeric};
use crate::config::EngineConfig;
use crate::error::{SqlError, SqlResult};
use crate::value::Value;

/// Maximum LIKE pattern length accepted for regex translation
const MAX_LIKE_PATTERN_LEN: usize = 1024;

/// Maximum compiled size of a LIKE regex (1MB)
const MAX_REGEX_SIZE: usize = 1 << 20;

/// Compile a regex with size limits.
pub(crate) fn safe_regex(pattern: &str) -> SqlResult<Regex> {
    regex::RegexBuilder::new(pattern)
        .size_limit(MAX_REGEX_SIZE)
        .build()
        .map_err(|e| SqlError::runtime(format!("Invalid pattern: {}", e)))
}

/// Translate a LIKE pattern: `%` is any run, `_` any single character and
/// `\` escapes the next character. Matching is byte-exact.
pub(crate) fn like_to_regex(pattern: &str) -> SqlResult<Regex> {
    if pattern.len() > MAX_LIKE_PATTERN_LEN {
        return Err(SqlError::runtime(format!(
            "LIKE pattern too long: {} bytes (max {})",
            pattern.len(),
            MAX_LIKE_PATTERN_LEN
        )));
    }

    let mut regex_pattern = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex_pattern.push_str(".*"),
            '_' => regex_pattern.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex_pattern.push_str(&regex::escape(&escaped.to_string())),
                None => regex_pattern.push_str(&regex::escape("\\")),
            },
            other => regex_pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_pattern.push('$');
    safe_regex(&regex_pattern)
}

/// Three-valued AND over comparison outcomes.
fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn bool_value(b: Option<bool>) -> Value {
    b.map(Value::from_bool).unwrap_or(Value::Null)
}

fn truth(value: &Value) -> Option<bool> {
    if value.is_null() {
        None
    } else {
        Some(coerce::is_truthy(value))
    }
}

fn out_of_range(op: &str, left: i64, right: i64) -> SqlError {
    SqlError::runtime(format!(
        "BIGINT value is out of range in '({} {} {})'",
        left, op, right
    ))
}

/// Evaluates expressions against rows. Subqueries run through the same data
/// source and configuration.
pub(crate) struct Evaluator<'a> {
    source: &'a dyn DataSource,
    config: &'a EngineConfig,
    like_cache: RefCell<HashMap<String, Regex>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(source: &'a dyn DataSource, config: &'a EngineConfig) -> Self {
        Self {
            source,
            config,
            like_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    pub fn evaluate(&self, expr: &Expression, ctx: &EvalContext<'_>) -> SqlResult<Value> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Column(column) => self.lookup_column(column, ctx),
            Expression::Function(func) => builtins::call(self, func, ctx),
            Expression::BinaryOp { left, op, right } => self.binary(left, *op, right, ctx),
            Expression::UnaryOp { op, operand } => {
                let value = self.evaluate(operand, ctx)?;
                match op {
                    UnaryOperator::Not => Ok(bool_value(truth(&value).map(|b| !b))),
                    UnaryOperator::Negate => negate(&value),
                }
            }
            Expression::IsNull { expr, negated } => {
                let value = self.evaluate(expr, ctx)?;
                Ok(Value::from_bool(value.is_null() != *negated))
            }
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                let needle = self.evaluate(expr, ctx)?;
                let mut candidates = Vec::with_capacity(list.len());
                for item in list {
                    candidates.push(self.evaluate(item, ctx)?);
                }
                Ok(in_values(&needle, &candidates, *negated))
            }
            Expression::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let needle = self.evaluate(expr, ctx)?;
                let result = self.run_subquery(subquery, ctx)?;
                if result.columns.len() != 1 {
                    return Err(SqlError::runtime("Operand should contain 1 column(s)"));
                }
                let candidates: Vec<Value> = result
                    .rows
                    .iter()
                    .map(|row| row.cells().first().map(|c| c.value.clone()).unwrap_or_default())
                    .collect();
                Ok(in_values(&needle, &candidates, *negated))
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.evaluate(expr, ctx)?;
                let low = self.evaluate(low, ctx)?;
                let high = self.evaluate(high, ctx)?;
                let above = coerce::compare(&value, &low).map(|o| o != Ordering::Less);
                let below = coerce::compare(&value, &high).map(|o| o != Ordering::Greater);
                let inside = and3(above, below);
                Ok(bool_value(if *negated { inside.map(|b| !b) } else { inside }))
            }
            Expression::Subquery(query) => self.scalar_subquery(query, ctx),
            Expression::Wildcard { .. } => Err(SqlError::runtime("'*' is not valid in this context")),
        }
    }

    fn lookup_column(&self, column: &ColumnExpression, ctx: &EvalContext<'_>) -> SqlResult<Value> {
        let table = column.table.as_deref();

        if table.is_none() {
            if let Some(value) = ctx.aliases.and_then(|row| row.get(&column.name)) {
                return Ok(value.clone());
            }
        }

        match ctx.representative() {
            Some(row) => {
                if table.is_none() && row.is_ambiguous(&column.name) {
                    return Err(SqlError::runtime(format!(
                        "Column '{}' in field list is ambiguous",
                        column.name
                    )));
                }
                if let Some(value) = row.lookup(table, &column.name) {
                    if let Some(group) = ctx.group_rows() {
                        self.check_group_dependency(column, value, group)?;
                    }
                    return Ok(value.clone());
                }
            }
            // an empty group without a source header has no values to read
            None => {
                let from_outer = ctx.outer.and_then(|row| row.lookup(table, &column.name));
                return Ok(from_outer.cloned().unwrap_or_default());
            }
        }

        if let Some(value) = ctx.outer.and_then(|row| row.lookup(table, &column.name)) {
            return Ok(value.clone());
        }

        let name = match table {
            Some(table) => format!("{}.{}", table, column.name),
            None => column.name.clone(),
        };
        Err(SqlError::runtime(format!("Unknown column '{}'", name)))
    }

    /// The representative row stands in for the whole group; verify that
    /// every member agrees with it on this column.
    fn check_group_dependency(
        &self,
        column: &ColumnExpression,
        value: &Value,
        group: &[Row],
    ) -> SqlResult<()> {
        let table = column.table.as_deref();
        let differs = group.iter().any(|row| {
            row.lookup(table, &column.name)
                .is_some_and(|v| !coerce::strict_equal(v, value))
        });
        if !differs {
            return Ok(());
        }
        if self.config.only_full_group_by {
            return Err(SqlError::runtime(format!(
                "Column '{}' is not functionally dependent on the GROUP BY columns",
                column.name
            )));
        }
        warn!(
            "[SQL] Column '{}' differs within a group; using the first row's value",
            column.name
        );
        Ok(())
    }

    fn binary(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        ctx: &EvalContext<'_>,
    ) -> SqlResult<Value> {
        // AND / OR short-circuit on a decided left side
        match op {
            BinaryOperator::And => {
                let l = truth(&self.evaluate(left, ctx)?);
                if l == Some(false) {
                    return Ok(Value::from_bool(false));
                }
                let r = truth(&self.evaluate(right, ctx)?);
                return Ok(bool_value(and3(l, r)));
            }
            BinaryOperator::Or => {
                let l = truth(&self.evaluate(left, ctx)?);
                if l == Some(true) {
                    return Ok(Value::from_bool(true));
                }
                let r = truth(&self.evaluate(right, ctx)?);
                return Ok(bool_value(or3(l, r)));
            }
            _ => {}
        }

        let l = self.evaluate(left, ctx)?;
        let r = self.evaluate(right, ctx)?;

        match op {
            BinaryOperator::Xor => Ok(bool_value(
                truth(&l).zip(truth(&r)).map(|(a, b)| a != b),
            )),
            BinaryOperator::NullSafeEqual => Ok(Value::from_bool(match (l.is_null(), r.is_null()) {
                (true, true) => true,
                (false, false) => coerce::loose_equal(&l, &r),
                _ => false,
            })),
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual => {
                let outcome = coerce::compare(&l, &r).map(|ord| match op {
                    BinaryOperator::Equal => ord == Ordering::Equal,
                    BinaryOperator::NotEqual => ord != Ordering::Equal,
                    BinaryOperator::LessThan => ord == Ordering::Less,
                    BinaryOperator::LessThanOrEqual => ord != Ordering::Greater,
                    BinaryOperator::GreaterThan => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                });
                Ok(bool_value(outcome))
            }
            BinaryOperator::Like | BinaryOperator::NotLike => {
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let matched = self.like(&coerce::to_text(&l), &coerce::to_text(&r))?;
                Ok(Value::from_bool(matched != (op == BinaryOperator::NotLike)))
            }
            BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply => {
                arithmetic(op, &l, &r)
            }
            BinaryOperator::Divide => {
                let (Some(a), Some(b)) = (coerce::to_numeric(&l), coerce::to_numeric(&r)) else {
                    return Ok(Value::Null);
                };
                if b.as_f64() == 0.0 {
                    return Ok(Value::Null);
                }
                Ok(Value::Float(a.as_f64() / b.as_f64()))
            }
            BinaryOperator::IntDivide => {
                let (Some(a), Some(b)) = (coerce::to_numeric(&l), coerce::to_numeric(&r)) else {
                    return Ok(Value::Null);
                };
                match (a, b) {
                    (_, b) if b.as_f64() == 0.0 => Ok(Value::Null),
                    (Numeric::Int(x), Numeric::Int(y)) => x
                        .checked_div(y)
                        .map(Value::Int)
                        .ok_or_else(|| out_of_range("DIV", x, y)),
                    (a, b) => Ok(Value::Int((a.as_f64() / b.as_f64()).trunc() as i64)),
                }
            }
            BinaryOperator::Modulo => Ok(builtins::modulo(&l, &r)),
            BinaryOperator::And => Ok(bool_value(and3(truth(&l), truth(&r)))),
            BinaryOperator::Or => Ok(bool_value(or3(truth(&l), truth(&r)))),
        }
    }

    fn like(&self, text: &str, pattern: &str) -> SqlResult<bool> {
        if let Some(re) = self.like_cache.borrow().get(pattern) {
            return Ok(re.is_match(text));
        }
        let re = like_to_regex(pattern)?;
        let matched = re.is_match(text);
        self.like_cache.borrow_mut().insert(pattern.to_string(), re);
        Ok(matched)
    }

    /// Run a subquery with the current row visible as its outer row.
    pub fn run_subquery(&self, query: &SelectQuery, ctx: &EvalContext<'_>) -> SqlResult<ResultSet> {
        let mut outer = ctx.representative().cloned().unwrap_or_default();
        if let Some(enclosing) = ctx.outer {
            outer = outer.join(enclosing);
        }
        SelectExecutor::new(self.source, self.config).execute(query, Some(&outer))
    }

    fn scalar_subquery(&self, query: &SelectQuery, ctx: &EvalContext<'_>) -> SqlResult<Value> {
        let result = self.run_subquery(query, ctx)?;
        if result.columns.len() != 1 {
            return Err(SqlError::runtime("Operand should contain 1 column(s)"));
        }
        match result.rows.as_slice() {
            [] => Ok(Value::Null),
            [row] => Ok(row.cells().first().map(|c| c.value.clone()).unwrap_or_default()),
            _ => Err(SqlError::runtime("Subquery returns more than 1 row")),
        }
    }
}

fn negate(value: &Value) -> SqlResult<Value> {
    match coerce::to_numeric(value) {
        None => Ok(Value::Null),
        Some(Numeric::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| SqlError::runtime(format!("BIGINT value is out of range in '-({})'", i))),
        Some(Numeric::Float(f)) => Ok(Value::Float(-f)),
    }
}

fn arithmetic(op: BinaryOperator, l: &Value, r: &Value) -> SqlResult<Value> {
    let (Some(a), Some(b)) = (coerce::to_numeric(l), coerce::to_numeric(r)) else {
        return Ok(Value::Null);
    };
    match (a, b) {
        (Numeric::Int(x), Numeric::Int(y)) => {
            let result = match op {
                BinaryOperator::Add => x.checked_add(y),
                BinaryOperator::Subtract => x.checked_sub(y),
                _ => x.checked_mul(y),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| out_of_range(op.symbol(), x, y))
        }
        (a, b) => {
            let (x, y) = (a.as_f64(), b.as_f64());
            Ok(Value::Float(match op {
                BinaryOperator::Add => x + y,
                BinaryOperator::Subtract => x - y,
                _ => x * y,
            }))
        }
    }
}

/// MySQL `IN`: true on a match, NULL if no match but a NULL was involved.
fn in_values(needle: &Value, candidates: &[Value], negated: bool) -> Value {
    if needle.is_null() {
        return Value::Null;
    }
    let mut saw_null = false;
    for candidate in candidates {
        if candidate.is_null() {
            saw_null = true;
        } else if coerce::loose_equal(needle, candidate) {
            return Value::from_bool(!negated);
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::from_bool(negated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InMemoryStore;
    use crate::parser::parse;
    use crate::ast::Query;

    fn eval_with(sql_expr: &str, row: &Row) -> SqlResult<Value> {
        let query = match parse(&format!("SELECT {}", sql_expr))? {
            Query::Select(q) => q,
            _ => unreachable!(),
        };
        let store = InMemoryStore::new();
        let config = EngineConfig::default();
        let evaluator = Evaluator::new(&store, &config);
        evaluator.evaluate(&query.items[0].expression, &EvalContext::single(row))
    }

    fn eval(sql_expr: &str) -> Value {
        eval_with(sql_expr, &Row::new()).unwrap()
    }

    #[test]
    fn test_comparisons_return_integers() {
        assert_eq!(eval("1 = 1"), Value::Int(1));
        assert_eq!(eval("1 < 0"), Value::Int(0));
        assert_eq!(eval("NULL = NULL"), Value::Null);
        assert_eq!(eval("NULL <=> NULL"), Value::Int(1));
        assert_eq!(eval("1 <=> NULL"), Value::Int(0));
        assert_eq!(eval("'10' > 9"), Value::Int(1));
        assert_eq!(eval("'abc' = 0"), Value::Int(1));
        assert_eq!(eval("'B' = 'b'"), Value::Int(0));
        assert_eq!(eval("2 = 2.0"), Value::Int(1));
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(eval("NULL AND 0"), Value::Int(0));
        assert_eq!(eval("NULL AND 1"), Value::Null);
        assert_eq!(eval("NULL OR 1"), Value::Int(1));
        assert_eq!(eval("NULL OR 0"), Value::Null);
        assert_eq!(eval("1 XOR 1"), Value::Int(0));
        assert_eq!(eval("1 XOR NULL"), Value::Null);
        assert_eq!(eval("NOT NULL"), Value::Null);
        assert_eq!(eval("NOT 0"), Value::Int(1));
        assert_eq!(eval("NULL IS NULL"), Value::Int(1));
        assert_eq!(eval("0 IS NOT NULL"), Value::Int(1));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("1 + 0.5"), Value::Float(1.5));
        assert_eq!(eval("'3 apples' + 1"), Value::Int(4));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("1 / 0"), Value::Null);
        assert_eq!(eval("7 DIV 2"), Value::Int(3));
        assert_eq!(eval("7 % 3"), Value::Int(1));
        assert_eq!(eval("-7 MOD 3"), Value::Int(-1));
        assert_eq!(eval("5 % 0"), Value::Null);
        assert_eq!(eval("NULL + 1"), Value::Null);
        assert_eq!(eval("-(2 + 3)"), Value::Int(-5));
        assert!(eval_with("9223372036854775807 + 1", &Row::new())
            .unwrap_err()
            .is_runtime_error());
    }

    #[test]
    fn test_like() {
        assert_eq!(eval("'mario' LIKE 'ma%'"), Value::Int(1));
        assert_eq!(eval("'mario' LIKE 'm_rio'"), Value::Int(1));
        assert_eq!(eval("'Mario' LIKE 'mario'"), Value::Int(0));
        assert_eq!(eval("'a.c' LIKE 'a.c'"), Value::Int(1));
        assert_eq!(eval("'abc' LIKE 'a.c'"), Value::Int(0));
        assert_eq!(eval("'50%' LIKE '50\\%'"), Value::Int(1));
        assert_eq!(eval("'500' LIKE '50\\%'"), Value::Int(0));
        assert_eq!(eval("'x' NOT LIKE 'y%'"), Value::Int(1));
        assert_eq!(eval("NULL LIKE '%'"), Value::Null);
        assert_eq!(eval("'line\nbreak' LIKE 'line%'"), Value::Int(1));
    }

    #[test]
    fn test_in_and_between() {
        assert_eq!(eval("2 IN (1, 2, 3)"), Value::Int(1));
        assert_eq!(eval("5 IN (1, 2)"), Value::Int(0));
        assert_eq!(eval("5 IN (1, NULL)"), Value::Null);
        assert_eq!(eval("5 NOT IN (1, NULL)"), Value::Null);
        assert_eq!(eval("1 NOT IN (1, NULL)"), Value::Int(0));
        assert_eq!(eval("NULL IN (1)"), Value::Null);
        assert_eq!(eval("'2' IN (1, 2)"), Value::Int(1));
        assert_eq!(eval("5 BETWEEN 1 AND 10"), Value::Int(1));
        assert_eq!(eval("5 NOT BETWEEN 1 AND 10"), Value::Int(0));
        assert_eq!(eval("5 BETWEEN NULL AND 4"), Value::Int(0));
        assert_eq!(eval("5 BETWEEN NULL AND 10"), Value::Null);
    }

    #[test]
    fn test_column_lookup() {
        let mut row = Row::new();
        row.push(Some("c"), "id", Value::Int(3));
        row.push(Some("c"), "name", Value::from("sonic"));

        assert_eq!(eval_with("c.id + 1", &row).unwrap(), Value::Int(4));
        assert_eq!(eval_with("NAME", &row).unwrap(), Value::from("sonic"));
        let err = eval_with("missing", &row).unwrap_err();
        assert_eq!(err, SqlError::runtime("Unknown column 'missing'"));
        assert!(eval_with("x.id", &row).is_err());

        row.push(Some("t"), "id", Value::Int(9));
        let err = eval_with("id", &row).unwrap_err();
        assert_eq!(err, SqlError::runtime("Column 'id' in field list is ambiguous"));
        assert_eq!(eval_with("t.id", &row).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_aggregate_outside_group() {
        let err = eval_with("COUNT(*)", &Row::new()).unwrap_err();
        assert_eq!(err, SqlError::runtime("Invalid use of group function"));
    }

    #[test]
    fn test_like_to_regex_escapes_metacharacters() {
        let re = like_to_regex("(a|b)%").unwrap();
        assert!(re.is_match("(a|b)xyz"));
        assert!(!re.is_match("a"));
        assert!(like_to_regex(&"%".repeat(2000)).is_err());
    }
}
