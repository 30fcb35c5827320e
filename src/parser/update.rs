use crate::ast::UpdateQuery;
use crate::error::{SqlError, SqlResult};
use crate::lexer::{Clause, Token, TokenKind};

use super::{
    skip_index_hints, ClauseOrder, Cursor, ExpressionParser, LimitParser, OrderByParser, SetParser,
};

const UPDATE_ORDER: &[(Clause, u8)] = &[
    (Clause::Update, 1),
    (Clause::Set, 2),
    (Clause::Where, 3),
    (Clause::OrderBy, 4),
    (Clause::Limit, 5),
];

pub struct UpdateParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> UpdateParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, UpdateQuery)> {
        let mut order = ClauseOrder::new(UPDATE_ORDER);

        if !self.cursor.check_clause(Clause::Update) {
            return Err(self.cursor.unexpected_token());
        }
        order.accept(Clause::Update, &self.cursor)?;
        self.cursor.advance();

        let table = self.cursor.expect_table_name()?;
        skip_index_hints(&mut self.cursor)?;

        let mut query = UpdateQuery {
            table,
            set_clause: Vec::new(),
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
                        Clause::Set => {
                            let (next, set_clause) = SetParser::new(tokens, sql, pos).parse()?;
                            query.set_clause = set_clause;
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

        if query.set_clause.is_empty() {
            return Err(SqlError::parse("expected SET clause"));
        }
        Ok((self.cursor.pos, query))
    }
}
