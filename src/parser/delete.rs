use crate::ast::DeleteQuery;
use crate::error::{SqlError, SqlResult};
use crate::lexer::{Clause, Token, TokenKind};

use super::{ClauseOrder, Cursor, ExpressionParser, FromParser, LimitParser, OrderByParser};

const DELETE_ORDER: &[(Clause, u8)] = &[
    (Clause::Delete, 1),
    (Clause::From, 2),
    (Clause::Where, 3),
    (Clause::OrderBy, 4),
    (Clause::Limit, 5),
];

pub struct DeleteParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> DeleteParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, DeleteQuery)> {
        let mut order = ClauseOrder::new(DELETE_ORDER);

        if !self.cursor.check_clause(Clause::Delete) {
            return Err(self.cursor.unexpected_token());
        }
        order.accept(Clause::Delete, &self.cursor)?;
        self.cursor.advance();

        let mut query = DeleteQuery {
            from_clause: None,
            where_clause: None,
            order_by: Vec::new(),
            limit_clause: None,
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
                    let next = match clause {
                        Clause::From => {
                            let (next, mut sources) = FromParser::new(tokens, sql, pos).parse()?;
                            if sources.len() != 1 || sources[0].subquery.is_some() {
                                return Err(SqlError::parse(
                                    "DELETE supports a single table in FROM",
                                ));
                            }
                            query.from_clause = sources.pop();
                            next
                        }
                        Clause::Where => {
                            let (next, expr) = ExpressionParser::new(tokens, sql, pos + 1).parse()?;
                            query.where_clause = Some(expr);
                            next
                        }
                        Clause::OrderBy => {
                            let (next, order_by) = OrderByParser::new(tokens, sql, pos).parse()?;
                            query.order_by = order_by;
                            next
                        }
                        Clause::Limit => {
                            let (next, limit) = LimitParser::new(tokens, sql, pos).parse()?;
                            query.limit_clause = Some(limit);
                            next
                        }
                        other => return Err(self.cursor.unexpected_clause(other)),
                    };
                    self.cursor.pos = next;
                }
                TokenKind::Separator if token.value == ";" => self.cursor.advance(),
                _ => return Err(self.cursor.unexpected_token()),
            }
        }

        if query.from_clause.is_none() {
            return Err(SqlError::parse("expected FROM clause"));
        }
        Ok((self.cursor.pos, query))
    }
}
