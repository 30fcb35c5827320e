use crate::ast::{Expression, InsertQuery};
use crate::error::{SqlError, SqlResult};
use crate::lexer::{Clause, Token, TokenKind};

use super::{ClauseOrder, Cursor, ExpressionParser, SelectParser, SetParser};

/// VALUES, SELECT and SET are alternative row sources and share a rank.
const INSERT_ORDER: &[(Clause, u8)] = &[
    (Clause::Insert, 1),
    (Clause::Values, 2),
    (Clause::Select, 2),
    (Clause::Set, 2),
    (Clause::OnDuplicateKeyUpdate, 3),
];

pub struct InsertParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> InsertParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    fn parse_column_list(&mut self) -> SqlResult<Vec<String>> {
        let mut columns = Vec::new();
        if !self.cursor.eat(TokenKind::Paren, "(") {
            return Ok(columns);
        }
        loop {
            columns.push(self.cursor.expect_identifier("column name")?);
            if !self.cursor.eat(TokenKind::Separator, ",") {
                break;
            }
        }
        self.cursor.expect(TokenKind::Paren, ")")?;
        Ok(columns)
    }

    fn parse_values(&mut self) -> SqlResult<Vec<Vec<Expression>>> {
        self.cursor.advance();
        let mut rows = Vec::new();
        loop {
            self.cursor.expect(TokenKind::Paren, "(")?;
            let mut row = Vec::new();
            if !self.cursor.eat(TokenKind::Paren, ")") {
                loop {
                    let (pos, expr) =
                        ExpressionParser::new(self.cursor.tokens, self.cursor.sql, self.cursor.pos)
                            .parse()?;
                    self.cursor.pos = pos;
                    row.push(expr);
                    if !self.cursor.eat(TokenKind::Separator, ",") {
                        break;
                    }
                }
                self.cursor.expect(TokenKind::Paren, ")")?;
            }
            rows.push(row);
            if !self.cursor.eat(TokenKind::Separator, ",") {
                return Ok(rows);
            }
        }
    }

    /// End of an `INSERT ... SELECT` body: the ON DUPLICATE KEY UPDATE clause
    /// or the end of the statement.
    fn select_end(&self) -> usize {
        self.cursor.tokens[self.cursor.pos..]
            .iter()
            .position(|t| t.clause() == Some(Clause::OnDuplicateKeyUpdate))
            .map(|i| self.cursor.pos + i)
            .unwrap_or(self.cursor.tokens.len())
    }

    pub fn parse(mut self) -> SqlResult<(usize, InsertQuery)> {
        let mut order = ClauseOrder::new(INSERT_ORDER);

        if !self.cursor.check_clause(Clause::Insert) {
            return Err(self.cursor.unexpected_token());
        }
        order.accept(Clause::Insert, &self.cursor)?;
        self.cursor.advance();

        let ignore = self.cursor.eat(TokenKind::Reserved, "IGNORE");
        self.cursor.eat(TokenKind::Reserved, "INTO");
        let table = self.cursor.expect_table_name()?;
        let columns = self.parse_column_list()?;

        let mut query = InsertQuery {
            table,
            ignore,
            columns,
            values: Vec::new(),
            select: None,
            set_clause: Vec::new(),
            update_clause: Vec::new(),
            sql: self.cursor.sql.to_string(),
        };

        while let Some(token) = self.cursor.current() {
            match token.kind {
                TokenKind::Clause => {
                    let clause = token
                        .clause()
                        .ok_or_else(|| self.cursor.unexpected_token())?;
                    order.accept(clause, &self.cursor)?;
                    let (tokens, sql, pos) = (self.cursor.tokens, self.cursor.sql, self.cursor.pos);
                    match clause {
                        Clause::Values => query.values = self.parse_values()?,
                        Clause::Select => {
                            let end = self.select_end();
                            let (next, select) = SelectParser::new(&tokens[..end], sql, pos).parse()?;
                            query.select = Some(Box::new(select));
                            self.cursor.pos = next;
                        }
                        Clause::Set => {
                            let (next, set_clause) = SetParser::new(tokens, sql, pos).parse()?;
                            query.set_clause = set_clause;
                            self.cursor.pos = next;
                        }
                        Clause::OnDuplicateKeyUpdate => {
                            let (next, update_clause) = SetParser::new(tokens, sql, pos).parse()?;
                            query.update_clause = update_clause;
                            self.cursor.pos = next;
                        }
                        other => return Err(self.cursor.unexpected_clause(other)),
                    }
                }
                TokenKind::Separator if token.value == ";" => self.cursor.advance(),
                _ => return Err(self.cursor.unexpected_token()),
            }
        }

        if query.values.is_empty() && query.select.is_none() && query.set_clause.is_empty() {
            return Err(SqlError::parse("expected VALUES, SELECT or SET"));
        }
        if !query.set_clause.is_empty() && !query.columns.is_empty() {
            return Err(SqlError::parse("INSERT ... SET does not take a column list"));
        }
        Ok((self.cursor.pos, query))
    }
}
