//! Recursive-descent parser for MySQL statements.
//!
//! Statement parsers walk the token stream clause by clause and delegate each
//! clause body to a sub-parser. Every sub-parser is built from
//! `(tokens, sql, pointer)` and returns `(new_pointer, node)`; the pointer is
//! the only parse state, so parsers hold no shared mutable fields and can be
//! driven on any token sub-slice (subqueries reuse this with absolute offsets).

mod clauses;
mod delete;
mod expressions;
mod insert;
mod select;
mod update;

#[cfg(test)]
mod tests;

pub use clauses::{FromParser, JoinParser, LimitParser, OrderByParser, SetParser};
pub use delete::DeleteParser;
pub use expressions::ExpressionParser;
pub use insert::InsertParser;
pub use select::SelectParser;
pub use update::UpdateParser;

use tracing::debug;

use crate::ast::Query;
use crate::error::{SqlError, SqlResult};
use crate::lexer::{tokenize, Clause, Token, TokenKind};

/// Read position over a token slice, shared by all sub-parsers.
#[derive(Clone, Copy)]
pub(crate) struct Cursor<'t> {
    pub tokens: &'t [Token],
    pub sql: &'t str,
    pub pos: usize,
}

impl<'t> Cursor<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pos: usize) -> Self {
        Self { tokens, sql, pos }
    }

    pub fn current(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn check(&self, kind: TokenKind, value: &str) -> bool {
        self.current().is_some_and(|t| t.is(kind, value))
    }

    pub fn check_clause(&self, clause: Clause) -> bool {
        self.current().and_then(Token::clause) == Some(clause)
    }

    /// Consume the token if it matches.
    pub fn eat(&mut self, kind: TokenKind, value: &str) -> bool {
        if self.check(kind, value) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: TokenKind, value: &str) -> SqlResult<&'t Token> {
        match self.current() {
            Some(token) if token.is(kind, value) => {
                self.advance();
                Ok(token)
            }
            Some(token) => Err(SqlError::parse(format!(
                "Expected '{}', found '{}'",
                value, token.raw
            ))),
            None => Err(SqlError::parse(format!(
                "Expected '{}', found end of statement",
                value
            ))),
        }
    }

    pub fn expect_identifier(&mut self, what: &str) -> SqlResult<String> {
        match self.current() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.advance();
                Ok(token.value.clone())
            }
            _ => Err(SqlError::parse(format!("expected {}", what))),
        }
    }

    /// Table name, allowing a `database.` prefix that is dropped.
    pub fn expect_table_name(&mut self) -> SqlResult<String> {
        let mut name = self.expect_identifier("table name")?;
        if self.check(TokenKind::Separator, ".")
            && self.peek(1).is_some_and(|t| t.kind == TokenKind::Identifier)
        {
            self.advance();
            name = self.expect_identifier("table name")?;
        }
        Ok(name)
    }

    /// Optional `[AS] alias`.
    pub fn parse_alias(&mut self) -> SqlResult<Option<String>> {
        if self.eat(TokenKind::Reserved, "AS") {
            return match self.current() {
                Some(t) if matches!(t.kind, TokenKind::Identifier | TokenKind::StringLiteral) => {
                    self.advance();
                    Ok(Some(t.value.clone()))
                }
                _ => Err(SqlError::parse("expected alias after AS")),
            };
        }
        match self.current() {
            Some(t) if t.kind == TokenKind::Identifier => {
                self.advance();
                Ok(Some(t.value.clone()))
            }
            _ => Ok(None),
        }
    }

    pub fn unexpected_token(&self) -> SqlError {
        SqlError::UnexpectedToken {
            token: self.current().map(|t| t.raw.clone()).unwrap_or_default(),
            sql: self.sql.to_string(),
        }
    }

    pub fn unexpected_clause(&self, clause: Clause) -> SqlError {
        SqlError::UnexpectedClause {
            clause: clause.keyword().to_string(),
            sql: self.sql.to_string(),
        }
    }

    /// Source text spanning tokens `start..end`.
    pub fn text(&self, start: usize, end: usize) -> &'t str {
        match (self.tokens.get(start), end.checked_sub(1).and_then(|i| self.tokens.get(i))) {
            (Some(first), Some(last)) if end > start => self
                .sql
                .get(first.offset..last.end_offset())
                .unwrap_or_default(),
            _ => "",
        }
    }
}

/// Enforces the fixed clause order of one statement kind.
pub(crate) struct ClauseOrder {
    ranks: &'static [(Clause, u8)],
    current: u8,
}

impl ClauseOrder {
    pub fn new(ranks: &'static [(Clause, u8)]) -> Self {
        Self { ranks, current: 0 }
    }

    /// Accept `clause` if it is allowed and ranks strictly after the last one.
    pub fn accept(&mut self, clause: Clause, cursor: &Cursor<'_>) -> SqlResult<()> {
        let rank = self
            .ranks
            .iter()
            .find(|(c, _)| *c == clause)
            .map(|(_, r)| *r)
            .ok_or_else(|| cursor.unexpected_clause(clause))?;
        if rank <= self.current {
            return Err(cursor.unexpected_clause(clause));
        }
        self.current = rank;
        Ok(())
    }
}

/// Index of the `)` matching the `(` at `open`.
pub(crate) fn find_closing_paren(tokens: &[Token], open: usize) -> SqlResult<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != TokenKind::Paren {
            continue;
        }
        if token.value == "(" {
            depth += 1;
        } else {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Ok(i);
            }
        }
    }
    Err(SqlError::parse("Unbalanced parentheses"))
}

/// Skip `USE|FORCE|IGNORE INDEX|KEY [FOR ...] (names)` hints after a table name.
pub(crate) fn skip_index_hints(cursor: &mut Cursor<'_>) -> SqlResult<()> {
    loop {
        let is_hint = cursor.current().is_some_and(|t| {
            t.kind == TokenKind::Reserved && matches!(t.value.as_str(), "USE" | "FORCE" | "IGNORE")
        }) && cursor.peek(1).is_some_and(|t| {
            t.kind == TokenKind::Reserved && matches!(t.value.as_str(), "INDEX" | "KEY")
        });
        if !is_hint {
            return Ok(());
        }
        cursor.advance();
        cursor.advance();

        if cursor.eat(TokenKind::Reserved, "FOR") {
            let target = cursor.current().is_some_and(|t| {
                t.is(TokenKind::Reserved, "JOIN")
                    || matches!(t.clause(), Some(Clause::OrderBy) | Some(Clause::GroupBy))
            });
            if !target {
                return Err(SqlError::parse("expected JOIN, ORDER BY or GROUP BY after FOR"));
            }
            cursor.advance();
        }

        if !cursor.check(TokenKind::Paren, "(") {
            return Err(SqlError::parse("expected index list"));
        }
        cursor.pos = find_closing_paren(cursor.tokens, cursor.pos)? + 1;

        // another hint may follow after a comma
        let continues = cursor.check(TokenKind::Separator, ",")
            && cursor.peek(1).is_some_and(|t| {
                t.kind == TokenKind::Reserved
                    && matches!(t.value.as_str(), "USE" | "FORCE" | "IGNORE")
            });
        if continues {
            cursor.advance();
        }
    }
}

/// Top-level statement parser.
pub struct SqlParser<'t> {
    tokens: &'t [Token],
    sql: &'t str,
}

impl<'t> SqlParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str) -> Self {
        Self { tokens, sql }
    }

    /// Parse one statement, dispatching on its leading keyword.
    pub fn parse(self) -> SqlResult<Query> {
        let cursor = Cursor::new(self.tokens, self.sql, 0);
        let query = match cursor.current().and_then(Token::clause) {
            Some(Clause::Select) => {
                let (_, query) = SelectParser::new(self.tokens, self.sql, 0).parse()?;
                Query::Select(query)
            }
            Some(Clause::Update) => {
                let (_, query) = UpdateParser::new(self.tokens, self.sql, 0).parse()?;
                Query::Update(query)
            }
            Some(Clause::Delete) => {
                let (_, query) = DeleteParser::new(self.tokens, self.sql, 0).parse()?;
                Query::Delete(query)
            }
            Some(Clause::Insert) => {
                let (_, query) = InsertParser::new(self.tokens, self.sql, 0).parse()?;
                Query::Insert(query)
            }
            _ => return Err(cursor.unexpected_token()),
        };
        debug!("[SQL] Parsed {} statement", query.kind());
        Ok(query)
    }
}

/// Tokenize and parse a single statement.
pub fn parse(sql: &str) -> SqlResult<Query> {
    let tokens = tokenize(sql)?;
    SqlParser::new(&tokens, sql).parse()
}
