//! Abstract syntax tree for parsed statements.
//!
//! Nodes are built once by the parser and never mutated afterwards. `Display`
//! renders every node back to SQL that parses to the same tree.

use std::fmt;

use crate::value::Value;

/// A reference to a column, optionally qualified by table name or alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpression {
    pub name: String,
    pub table: Option<String>,
}

impl ColumnExpression {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: Some(table.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    /// Upper-cased function name
    pub name: String,
    pub args: Vec<Expression>,
    pub distinct: bool,
}

impl FunctionExpression {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
            distinct: false,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        is_aggregate_function(&self.name)
    }
}

pub fn is_aggregate_function(name: &str) -> bool {
    matches!(name, "COUNT" | "SUM" | "MIN" | "MAX" | "AVG")
}

/// Minimum argument count of the built-in functions that reject an empty
/// argument list at parse time.
pub fn min_arity(name: &str) -> Option<usize> {
    let min = match name {
        "COUNT" | "SUM" | "MIN" | "MAX" | "AVG" | "IFNULL" | "COALESCE" | "LENGTH"
        | "CHAR_LENGTH" | "CHARACTER_LENGTH" | "LOWER" | "UPPER" | "BINARY" | "FROM_UNIXTIME"
        | "VALUES" | "TRIM" | "LTRIM" | "RTRIM" | "ABS" | "CEIL" | "CEILING" | "FLOOR"
        | "ROUND" | "EXISTS" => 1,
        "MOD" | "NULLIF" | "SUBSTRING" | "SUBSTR" | "CONCAT" | "CONCAT_WS" | "FIELD"
        | "GREATEST" | "LEAST" => 2,
        "IF" | "SUBSTRING_INDEX" | "REPLACE" => 3,
        _ => return None,
    };
    Some(min)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    Xor,
    And,
    Equal,
    NullSafeEqual,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
    NotLike,
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDivide,
    Modulo,
}

impl BinaryOperator {
    pub fn from_token(value: &str) -> Option<Self> {
        let op = match value {
            "OR" | "||" => BinaryOperator::Or,
            "XOR" => BinaryOperator::Xor,
            "AND" | "&&" => BinaryOperator::And,
            "=" => BinaryOperator::Equal,
            "<=>" => BinaryOperator::NullSafeEqual,
            "!=" | "<>" => BinaryOperator::NotEqual,
            "<" => BinaryOperator::LessThan,
            "<=" => BinaryOperator::LessThanOrEqual,
            ">" => BinaryOperator::GreaterThan,
            ">=" => BinaryOperator::GreaterThanOrEqual,
            "LIKE" => BinaryOperator::Like,
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "DIV" => BinaryOperator::IntDivide,
            "%" | "MOD" => BinaryOperator::Modulo,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::Xor => "XOR",
            BinaryOperator::And => "AND",
            BinaryOperator::Equal => "=",
            BinaryOperator::NullSafeEqual => "<=>",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::IntDivide => "DIV",
            BinaryOperator::Modulo => "%",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NullSafeEqual
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
                | BinaryOperator::Like
                | BinaryOperator::NotLike
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnExpression),
    Literal(Value),
    Function(FunctionExpression),
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expression>,
        subquery: Box<SelectQuery>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    Subquery(Box<SelectQuery>),
    /// `*` or `table.*`
    Wildcard { table: Option<String> },
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(ColumnExpression::new(name))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Whether an aggregate call appears in this expression. Subqueries form
    /// their own aggregation scope and are not searched.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expression::Function(f) => f.is_aggregate() || f.args.iter().any(Self::contains_aggregate),
            Expression::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expression::UnaryOp { operand, .. } => operand.contains_aggregate(),
            Expression::IsNull { expr, .. } | Expression::InSubquery { expr, .. } => {
                expr.contains_aggregate()
            }
            Expression::InList { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Self::contains_aggregate)
            }
            Expression::Between { expr, low, high, .. } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expression::Column(_)
            | Expression::Literal(_)
            | Expression::Subquery(_)
            | Expression::Wildcard { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expression: Expression,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitClause {
    pub row_count: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnExpression,
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expression: Expression,
    pub alias: Option<String>,
    /// Source text of the expression, used to name unaliased columns
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOperator {
    On,
    Using,
}

/// One table source in a FROM chain. The first descriptor of a chain is the
/// base table; its join fields are unused.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinDescriptor {
    pub name: String,
    pub subquery: Option<Box<SelectQuery>>,
    pub join_type: JoinType,
    pub join_operator: Option<JoinOperator>,
    pub alias: String,
    /// Join predicate; USING columns are expanded into an equality conjunction
    pub join_expression: Option<Expression>,
    pub using_columns: Vec<String>,
}

impl JoinDescriptor {
    pub fn table(name: impl Into<String>, alias: Option<String>) -> Self {
        let name = name.into();
        Self {
            alias: alias.unwrap_or_else(|| name.clone()),
            name,
            subquery: None,
            join_type: JoinType::Inner,
            join_operator: None,
            join_expression: None,
            using_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Vec<JoinDescriptor>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit_clause: Option<LimitClause>,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub set_clause: Vec<Assignment>,
    pub where_clause: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit_clause: Option<LimitClause>,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub from_clause: Option<JoinDescriptor>,
    pub where_clause: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit_clause: Option<LimitClause>,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub ignore: bool,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expression>>,
    pub select: Option<Box<SelectQuery>>,
    pub set_clause: Vec<Assignment>,
    pub update_clause: Vec<Assignment>,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(SelectQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    Insert(InsertQuery),
}

impl Query {
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Select(_) => "SELECT",
            Query::Update(_) => "UPDATE",
            Query::Delete(_) => "DELETE",
            Query::Insert(_) => "INSERT",
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Query::Select(q) => &q.sql,
            Query::Update(q) => &q.sql,
            Query::Delete(q) => &q.sql,
            Query::Insert(q) => &q.sql,
        }
    }
}

// ---------------------------------------------------------------------------
// SQL rendering
// ---------------------------------------------------------------------------

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Operands that are themselves operator forms get parentheses.
struct Operand<'a>(&'a Expression);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expression::BinaryOp { .. }
            | Expression::UnaryOp {
                op: UnaryOperator::Not,
                ..
            }
            | Expression::IsNull { .. }
            | Expression::InList { .. }
            | Expression::InSubquery { .. }
            | Expression::Between { .. } => write!(f, "({})", self.0),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for ColumnExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{}.", quote_identifier(table))?;
        }
        f.write_str(&quote_identifier(&self.name))
    }
}

impl fmt::Display for FunctionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write_list(f, &self.args)?;
        f.write_str(")")
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(column) => write!(f, "{}", column),
            Expression::Literal(value) => f.write_str(&value.to_sql_literal()),
            Expression::Function(func) => write!(f, "{}", func),
            Expression::BinaryOp { left, op, right } => {
                write!(f, "{} {} {}", Operand(left), op.symbol(), Operand(right))
            }
            Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            } => write!(f, "NOT {}", Operand(operand)),
            Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand,
            } => match operand.as_ref() {
                Expression::Column(_) | Expression::Function(_) => write!(f, "-{}", operand),
                other => write!(f, "-({})", other),
            },
            Expression::IsNull { expr, negated } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} IS {}NULL", Operand(expr), not)
            }
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN (", Operand(expr), not)?;
                write_list(f, list)?;
                f.write_str(")")
            }
            Expression::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN ({})", Operand(expr), not, subquery)
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(
                    f,
                    "{} {}BETWEEN {} AND {}",
                    Operand(expr),
                    not,
                    Operand(low),
                    Operand(high)
                )
            }
            Expression::Subquery(query) => write!(f, "({})", query),
            Expression::Wildcard { table: Some(table) } => {
                write!(f, "{}.*", quote_identifier(table))
            }
            Expression::Wildcard { table: None } => f.write_str("*"),
        }
    }
}

impl fmt::Display for OrderByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{} ASC", self.expression),
            SortDirection::Desc => write!(f, "{} DESC", self.expression),
        }
    }
}

impl fmt::Display for LimitClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset > 0 {
            write!(f, "LIMIT {}, {}", self.offset, self.row_count)
        } else {
            write!(f, "LIMIT {}", self.row_count)
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.expression)
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", quote_identifier(alias))?;
        }
        Ok(())
    }
}

impl fmt::Display for JoinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subquery {
            Some(query) => write!(f, "({})", query)?,
            None => f.write_str(&quote_identifier(&self.name))?,
        }
        if self.subquery.is_some() || self.alias != self.name {
            write!(f, " AS {}", quote_identifier(&self.alias))?;
        }
        match self.join_operator {
            Some(JoinOperator::On) => {
                if let Some(expr) = &self.join_expression {
                    write!(f, " ON {}", expr)?;
                }
            }
            Some(JoinOperator::Using) => {
                let columns: Vec<String> =
                    self.using_columns.iter().map(|c| quote_identifier(c)).collect();
                write!(f, " USING ({})", columns.join(", "))?;
            }
            None => {}
        }
        Ok(())
    }
}

fn write_order_and_limit(
    f: &mut fmt::Formatter<'_>,
    order_by: &[OrderByItem],
    limit: &Option<LimitClause>,
) -> fmt::Result {
    if !order_by.is_empty() {
        f.write_str(" ORDER BY ")?;
        write_list(f, order_by)?;
    }
    if let Some(limit) = limit {
        write!(f, " {}", limit)?;
    }
    Ok(())
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write_list(f, &self.items)?;
        for (i, source) in self.from.iter().enumerate() {
            if i == 0 {
                write!(f, " FROM {}", source)?;
                continue;
            }
            let keyword = match source.join_type {
                JoinType::Inner => "INNER JOIN",
                JoinType::Left => "LEFT JOIN",
                JoinType::Right => "RIGHT JOIN",
                JoinType::Cross => "CROSS JOIN",
            };
            write!(f, " {} {}", keyword, source)?;
        }
        if let Some(expr) = &self.where_clause {
            write!(f, " WHERE {}", expr)?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, &self.group_by)?;
        }
        if let Some(expr) = &self.having {
            write!(f, " HAVING {}", expr)?;
        }
        write_order_and_limit(f, &self.order_by, &self.limit_clause)
    }
}

impl fmt::Display for UpdateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {} SET ", quote_identifier(&self.table))?;
        write_list(f, &self.set_clause)?;
        if let Some(expr) = &self.where_clause {
            write!(f, " WHERE {}", expr)?;
        }
        write_order_and_limit(f, &self.order_by, &self.limit_clause)
    }
}
