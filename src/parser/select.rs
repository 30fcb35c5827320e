use crate::ast::{Expression, SelectItem, SelectQuery};
use crate::error::SqlResult;
use crate::lexer::{Clause, Token, TokenKind};

use super::{ClauseOrder, Cursor, ExpressionParser, FromParser, LimitParser, OrderByParser};

const SELECT_ORDER: &[(Clause, u8)] = &[
    (Clause::Select, 1),
    (Clause::From, 2),
    (Clause::Where, 3),
    (Clause::GroupBy, 4),
    (Clause::Having, 5),
    (Clause::OrderBy, 6),
    (Clause::Limit, 7),
];

pub struct SelectParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> SelectParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    fn expression(&mut self) -> SqlResult<Expression> {
        let (pos, expr) =
            ExpressionParser::new(self.cursor.tokens, self.cursor.sql, self.cursor.pos).parse()?;
        self.cursor.pos = pos;
        Ok(expr)
    }

    fn parse_select_list(&mut self, query: &mut SelectQuery) -> SqlResult<()> {
        if self.cursor.eat(TokenKind::Reserved, "DISTINCT") {
            query.distinct = true;
        } else {
            self.cursor.eat(TokenKind::Reserved, "ALL");
        }

        loop {
            let start = self.cursor.pos;
            let expression = self.expression()?;
            let text = self.cursor.text(start, self.cursor.pos).to_string();
            let alias = match expression {
                Expression::Wildcard { .. } => None,
                _ => self.cursor.parse_alias()?,
            };
            query.items.push(SelectItem {
                expression,
                alias,
                text,
            });
            if !self.cursor.eat(TokenKind::Separator, ",") {
                return Ok(());
            }
        }
    }

    fn parse_expression_list(&mut self) -> SqlResult<Vec<Expression>> {
        let mut list = vec![self.expression()?];
        while self.cursor.eat(TokenKind::Separator, ",") {
            list.push(self.expression()?);
        }
        Ok(list)
    }

    pub fn parse(mut self) -> SqlResult<(usize, SelectQuery)> {
        let start = self.cursor.pos;
        let mut order = ClauseOrder::new(SELECT_ORDER);
        let mut query = SelectQuery::default();

        if !self.cursor.check_clause(Clause::Select) {
            return Err(self.cursor.unexpected_token());
        }
        order.accept(Clause::Select, &self.cursor)?;
        self.cursor.advance();
        self.parse_select_list(&mut query)?;

        while let Some(token) = self.cursor.current() {
            match token.kind {
                TokenKind::Clause => {
                    let clause = token
                        .clause()
                        .ok_or_else(|| self.cursor.unexpected_token())?;
                    order.accept(clause, &self.cursor)?;
                    let (tokens, sql, pos) = (self.cursor.tokens, self.cursor.sql, self.cursor.pos);
                    match clause {
                        Clause::From => {
                            let (next, from) = FromParser::new(tokens, sql, pos).parse()?;
                            self.cursor.pos = next;
                            query.from = from;
                        }
                        Clause::Where => {
                            self.cursor.advance();
                            query.where_clause = Some(self.expression()?);
                        }
                        Clause::GroupBy => {
                            self.cursor.advance();
                            query.group_by = self.parse_expression_list()?;
                        }
                        Clause::Having => {
                            self.cursor.advance();
                            query.having = Some(self.expression()?);
                        }
                        Clause::OrderBy => {
                            let (next, order_by) = OrderByParser::new(tokens, sql, pos).parse()?;
                            self.cursor.pos = next;
                            query.order_by = order_by;
                        }
                        Clause::Limit => {
                            let (next, limit) = LimitParser::new(tokens, sql, pos).parse()?;
                            self.cursor.pos = next;
                            query.limit_clause = Some(limit);
                        }
                        other => return Err(self.cursor.unexpected_clause(other)),
                    }
                }
                TokenKind::Separator if token.value == ";" => self.cursor.advance(),
                _ => return Err(self.cursor.unexpected_token()),
            }
        }

        query.sql = self.cursor.text(start, self.cursor.pos).to_string();
        Ok((self.cursor.pos, query))
    }
}
