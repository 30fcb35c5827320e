//! Clause sub-parsers: FROM, JOIN, ORDER BY, LIMIT and SET.
//!
//! Each parser starts at its clause keyword and returns the pointer of the
//! first token it did not consume.

use crate::ast::{
    Assignment, BinaryOperator, ColumnExpression, Expression, JoinDescriptor, JoinOperator,
    JoinType, LimitClause, OrderByItem, SelectQuery, SortDirection,
};
use crate::error::{SqlError, SqlResult};
use crate::lexer::{Clause, Token, TokenKind};

use super::{find_closing_paren, skip_index_hints, Cursor, ExpressionParser, SelectParser};

fn parse_expression(cursor: &mut Cursor<'_>) -> SqlResult<Expression> {
    let (pos, expr) = ExpressionParser::new(cursor.tokens, cursor.sql, cursor.pos).parse()?;
    cursor.pos = pos;
    Ok(expr)
}

/// `ORDER BY expr [ASC|DESC], ...`
pub struct OrderByParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> OrderByParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, Vec<OrderByItem>)> {
        if !self.cursor.check_clause(Clause::OrderBy) {
            return Err(self.cursor.unexpected_token());
        }
        self.cursor.advance();

        let mut items = Vec::new();
        loop {
            let expression = parse_expression(&mut self.cursor)?;
            let direction = if self.cursor.eat(TokenKind::Reserved, "DESC") {
                SortDirection::Desc
            } else {
                self.cursor.eat(TokenKind::Reserved, "ASC");
                SortDirection::Asc
            };
            items.push(OrderByItem {
                expression,
                direction,
            });
            if !self.cursor.eat(TokenKind::Separator, ",") {
                break;
            }
        }
        Ok((self.cursor.pos, items))
    }
}

/// `LIMIT n`, `LIMIT offset, n` or `LIMIT n OFFSET offset`
pub struct LimitParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> LimitParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    fn parse_count(&mut self) -> SqlResult<usize> {
        match self.cursor.current() {
            Some(token) if token.kind == TokenKind::Numeric => {
                let count = token.value.parse::<usize>().map_err(|_| {
                    SqlError::parse(format!(
                        "LIMIT values must be non-negative integers, found '{}'",
                        token.raw
                    ))
                })?;
                self.cursor.advance();
                Ok(count)
            }
            Some(token) => Err(SqlError::parse(format!(
                "LIMIT values must be non-negative integers, found '{}'",
                token.raw
            ))),
            None => Err(SqlError::parse("expected a value after LIMIT")),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, LimitClause)> {
        if !self.cursor.check_clause(Clause::Limit) {
            return Err(self.cursor.unexpected_token());
        }
        self.cursor.advance();

        let first = self.parse_count()?;
        let limit = if self.cursor.eat(TokenKind::Separator, ",") {
            LimitClause {
                row_count: self.parse_count()?,
                offset: first,
            }
        } else if self.cursor.eat(TokenKind::Reserved, "OFFSET") {
            LimitClause {
                row_count: first,
                offset: self.parse_count()?,
            }
        } else {
            LimitClause {
                row_count: first,
                offset: 0,
            }
        };
        Ok((self.cursor.pos, limit))
    }
}

/// `SET col = expr, ...` and the assignment list of `ON DUPLICATE KEY UPDATE`.
///
/// Duplicate columns are accepted; the last assignment wins at execution.
pub struct SetParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> SetParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, Vec<Assignment>)> {
        match self.cursor.current().and_then(Token::clause) {
            Some(Clause::Set) | Some(Clause::OnDuplicateKeyUpdate) => self.cursor.advance(),
            _ => return Err(self.cursor.unexpected_token()),
        }

        let mut assignments = Vec::new();
        loop {
            let first = self.cursor.expect_identifier("column name in SET")?;
            let column = if self.cursor.eat(TokenKind::Separator, ".") {
                let name = self.cursor.expect_identifier("column name in SET")?;
                ColumnExpression::qualified(first, name)
            } else {
                ColumnExpression::new(first)
            };
            self.cursor.expect(TokenKind::Operator, "=")?;
            let expression = parse_expression(&mut self.cursor)?;
            assignments.push(Assignment { column, expression });

            if !self.cursor.eat(TokenKind::Separator, ",") {
                break;
            }
        }
        Ok((self.cursor.pos, assignments))
    }
}

/// A table name or a parenthesized derived table, with its alias.
fn parse_table_source(cursor: &mut Cursor<'_>) -> SqlResult<JoinDescriptor> {
    if cursor.check(TokenKind::Paren, "(") {
        let open = cursor.pos;
        let close = find_closing_paren(cursor.tokens, open)?;
        if cursor
            .peek(1)
            .map_or(true, |t| t.clause() != Some(Clause::Select))
        {
            return Err(SqlError::parse("expected SELECT in derived table"));
        }
        let (_, subquery): (usize, SelectQuery) =
            SelectParser::new(&cursor.tokens[..close], cursor.sql, open + 1).parse()?;
        cursor.pos = close + 1;

        let alias = cursor
            .parse_alias()?
            .ok_or_else(|| SqlError::parse("Every derived table must have its own alias"))?;
        return Ok(JoinDescriptor {
            name: alias.clone(),
            subquery: Some(Box::new(subquery)),
            join_type: JoinType::Inner,
            join_operator: None,
            alias,
            join_expression: None,
            using_columns: Vec::new(),
        });
    }

    let name = cursor.expect_table_name()?;
    let alias = cursor.parse_alias()?;
    skip_index_hints(cursor)?;
    Ok(JoinDescriptor::table(name, alias))
}

/// `[INNER|LEFT [OUTER]|RIGHT [OUTER]|CROSS] JOIN source [ON expr | USING (cols)]`
pub struct JoinParser<'t> {
    cursor: Cursor<'t>,
    /// Alias of the table to the left, used to qualify USING columns
    left_alias: String,
}

impl<'t> JoinParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize, left_alias: &str) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
            left_alias: left_alias.to_string(),
        }
    }

    /// Whether the cursor is at the start of a JOIN.
    pub(crate) fn at_join(cursor: &Cursor<'_>) -> bool {
        cursor.current().is_some_and(|t| {
            t.kind == TokenKind::Reserved
                && matches!(t.value.as_str(), "JOIN" | "INNER" | "LEFT" | "RIGHT" | "CROSS")
        })
    }

    fn parse_join_type(&mut self) -> SqlResult<JoinType> {
        let keyword = self
            .cursor
            .current()
            .map(|t| t.value.clone())
            .unwrap_or_default();
        let join_type = match keyword.as_str() {
            "JOIN" => return self.cursor.expect(TokenKind::Reserved, "JOIN").map(|_| JoinType::Inner),
            "INNER" => JoinType::Inner,
            "LEFT" => JoinType::Left,
            "RIGHT" => JoinType::Right,
            "CROSS" => JoinType::Cross,
            _ => return Err(self.cursor.unexpected_token()),
        };
        self.cursor.advance();
        if matches!(join_type, JoinType::Left | JoinType::Right) {
            self.cursor.eat(TokenKind::Reserved, "OUTER");
        }
        self.cursor.expect(TokenKind::Reserved, "JOIN")?;
        Ok(join_type)
    }

    fn parse_using(&mut self, right_alias: &str) -> SqlResult<(Vec<String>, Expression)> {
        self.cursor.expect(TokenKind::Paren, "(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.cursor.expect_identifier("column name in USING")?);
            if !self.cursor.eat(TokenKind::Separator, ",") {
                break;
            }
        }
        self.cursor.expect(TokenKind::Paren, ")")?;

        let mut predicate: Option<Expression> = None;
        for column in &columns {
            let equality = Expression::binary(
                Expression::Column(ColumnExpression::qualified(self.left_alias.clone(), column.clone())),
                BinaryOperator::Equal,
                Expression::Column(ColumnExpression::qualified(right_alias, column.clone())),
            );
            predicate = Some(match predicate {
                Some(existing) => Expression::binary(existing, BinaryOperator::And, equality),
                None => equality,
            });
        }
        predicate
            .map(|p| (columns, p))
            .ok_or_else(|| SqlError::parse("USING requires at least one column"))
    }

    pub fn parse(mut self) -> SqlResult<(usize, JoinDescriptor)> {
        let join_type = self.parse_join_type()?;
        let mut join = parse_table_source(&mut self.cursor)?;
        join.join_type = join_type;

        if self.cursor.eat(TokenKind::Reserved, "ON") {
            join.join_operator = Some(JoinOperator::On);
            join.join_expression = Some(parse_expression(&mut self.cursor)?);
        } else if self.cursor.eat(TokenKind::Reserved, "USING") {
            let (columns, predicate) = self.parse_using(&join.alias)?;
            join.join_operator = Some(JoinOperator::Using);
            join.using_columns = columns;
            join.join_expression = Some(predicate);
        } else if join_type != JoinType::Cross {
            return Err(SqlError::parse(format!(
                "expected ON or USING after joining '{}'",
                join.alias
            )));
        }

        Ok((self.cursor.pos, join))
    }
}

/// `FROM source [, source ...] [JOIN ...]`
pub struct FromParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> FromParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, Vec<JoinDescriptor>)> {
        if !self.cursor.check_clause(Clause::From) {
            return Err(self.cursor.unexpected_token());
        }
        self.cursor.advance();

        let mut sources = vec![parse_table_source(&mut self.cursor)?];
        loop {
            let left_alias = sources
                .last()
                .map(|s| s.alias.clone())
                .unwrap_or_default();

            if self.cursor.eat(TokenKind::Separator, ",") {
                let mut source = parse_table_source(&mut self.cursor)?;
                source.join_type = JoinType::Cross;
                sources.push(source);
            } else if JoinParser::at_join(&self.cursor) {
                let (pos, join) =
                    JoinParser::new(self.cursor.tokens, self.cursor.sql, self.cursor.pos, &left_alias)
                        .parse()?;
                self.cursor.pos = pos;
                sources.push(join);
            } else {
                break;
            }
        }
        Ok((self.cursor.pos, sources))
    }
}
