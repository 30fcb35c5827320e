//! Expression parsing.
//!
//! Precedence (lowest to highest):
//! 1. `OR`, `||`
//! 2. `XOR`
//! 3. `AND`, `&&`
//! 4. `NOT` (prefix keyword)
//! 5. Comparison: `=`, `<=>`, `<>`, `!=`, `<`, `<=`, `>`, `>=`, `IS [NOT] NULL`,
//!    `[NOT] LIKE`, `[NOT] IN`, `[NOT] BETWEEN`
//! 6. Additive: `+`, `-`
//! 7. Multiplicative: `*`, `/`, `DIV`, `%`, `MOD`
//! 8. Unary: `-`, `!`
//! 9. Primary: literals, columns, function calls, parenthesized expressions
//!    and subqueries

use crate::ast::{
    min_arity, BinaryOperator, ColumnExpression, Expression, FunctionExpression, UnaryOperator,
};
use crate::error::{SqlError, SqlResult};
use crate::lexer::{Clause, Token, TokenKind};
use crate::value::Value;

use super::{find_closing_paren, Cursor, SelectParser};

pub struct ExpressionParser<'t> {
    cursor: Cursor<'t>,
}

impl<'t> ExpressionParser<'t> {
    pub fn new(tokens: &'t [Token], sql: &'t str, pointer: usize) -> Self {
        Self {
            cursor: Cursor::new(tokens, sql, pointer),
        }
    }

    pub fn parse(mut self) -> SqlResult<(usize, Expression)> {
        let expr = self.parse_or()?;
        Ok((self.cursor.pos, expr))
    }

    fn check_operator(&self, values: &[&str]) -> Option<&'t str> {
        match self.cursor.current() {
            Some(t) if t.kind == TokenKind::Operator && values.contains(&t.value.as_str()) => {
                Some(t.value.as_str())
            }
            _ => None,
        }
    }

    fn parse_binary_level(
        &mut self,
        operators: &[&str],
        next: fn(&mut Self) -> SqlResult<Expression>,
    ) -> SqlResult<Expression> {
        let mut left = next(self)?;
        while let Some(symbol) = self.check_operator(operators) {
            let op = BinaryOperator::from_token(symbol)
                .ok_or_else(|| SqlError::parse(format!("Unknown operator '{}'", symbol)))?;
            self.cursor.advance();
            let right = next(self)?;
            left = Expression::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> SqlResult<Expression> {
        self.parse_binary_level(&["OR", "||"], Self::parse_xor)
    }

    fn parse_xor(&mut self) -> SqlResult<Expression> {
        self.parse_binary_level(&["XOR"], Self::parse_and)
    }

    fn parse_and(&mut self) -> SqlResult<Expression> {
        self.parse_binary_level(&["AND", "&&"], Self::parse_not)
    }

    /// Keyword `NOT` sits between AND and the comparisons, as in MySQL:
    /// `NOT a = b` negates the comparison. The `!` form binds tightest and
    /// is handled in `parse_unary`.
    fn parse_not(&mut self) -> SqlResult<Expression> {
        if self.cursor.eat(TokenKind::Operator, "NOT") {
            let operand = self.parse_not()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> SqlResult<Expression> {
        let mut left = self.parse_additive()?;

        loop {
            if let Some(symbol) = self.check_operator(&["=", "<=>", "<>", "!=", "<", "<=", ">", ">="]) {
                let op = BinaryOperator::from_token(symbol)
                    .ok_or_else(|| SqlError::parse(format!("Unknown operator '{}'", symbol)))?;
                self.cursor.advance();
                let right = self.parse_additive()?;
                left = Expression::binary(left, op, right);
                continue;
            }

            if self.cursor.eat(TokenKind::Operator, "IS") {
                let negated = self.cursor.eat(TokenKind::Operator, "NOT");
                if !self.cursor.eat(TokenKind::Null, "NULL") {
                    return Err(SqlError::parse("expected NULL after IS"));
                }
                left = Expression::IsNull {
                    expr: Box::new(left),
                    negated,
                };
                continue;
            }

            // NOT only continues a comparison when LIKE, IN or BETWEEN follows
            let negated = self.cursor.check(TokenKind::Operator, "NOT")
                && self.cursor.peek(1).is_some_and(|t| {
                    t.kind == TokenKind::Operator
                        && matches!(t.value.as_str(), "LIKE" | "IN" | "BETWEEN")
                });
            if negated {
                self.cursor.advance();
            }

            if self.cursor.eat(TokenKind::Operator, "LIKE") {
                let right = self.parse_additive()?;
                let op = if negated {
                    BinaryOperator::NotLike
                } else {
                    BinaryOperator::Like
                };
                left = Expression::binary(left, op, right);
            } else if self.cursor.eat(TokenKind::Operator, "IN") {
                left = self.parse_in(left, negated)?;
            } else if self.cursor.eat(TokenKind::Operator, "BETWEEN") {
                let low = self.parse_additive()?;
                self.cursor.expect(TokenKind::Operator, "AND")?;
                let high = self.parse_additive()?;
                left = Expression::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_in(&mut self, expr: Expression, negated: bool) -> SqlResult<Expression> {
        if !self.cursor.check(TokenKind::Paren, "(") {
            return Err(SqlError::parse("expected '(' after IN"));
        }

        if self
            .cursor
            .peek(1)
            .is_some_and(|t| t.clause() == Some(Clause::Select))
        {
            let subquery = self.parse_subquery()?;
            return Ok(Expression::InSubquery {
                expr: Box::new(expr),
                subquery: Box::new(subquery),
                negated,
            });
        }

        self.cursor.advance();
        let list = self.parse_argument_list()?;
        if list.is_empty() {
            return Err(SqlError::parse("IN list cannot be empty"));
        }
        Ok(Expression::InList {
            expr: Box::new(expr),
            list,
            negated,
        })
    }

    fn parse_additive(&mut self) -> SqlResult<Expression> {
        self.parse_binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> SqlResult<Expression> {
        self.parse_binary_level(&["*", "/", "DIV", "%", "MOD"], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> SqlResult<Expression> {
        if self.cursor.check(TokenKind::Operator, "-") {
            self.cursor.advance();
            // fold a directly following number into a negative literal
            if let Some(token) = self.cursor.current() {
                if token.kind == TokenKind::Numeric {
                    self.cursor.advance();
                    return Ok(Expression::Literal(parse_number(&format!("-{}", token.value))?));
                }
            }
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        if self.cursor.eat(TokenKind::Operator, "+") {
            return self.parse_unary();
        }

        if self.cursor.eat(TokenKind::Operator, "!") {
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> SqlResult<Expression> {
        let token = self
            .cursor
            .current()
            .ok_or_else(|| SqlError::parse("Unexpected end of expression"))?;

        match token.kind {
            TokenKind::Numeric => {
                self.cursor.advance();
                Ok(Expression::Literal(parse_number(&token.value)?))
            }
            TokenKind::StringLiteral => {
                self.cursor.advance();
                Ok(Expression::Literal(Value::String(token.value.clone())))
            }
            TokenKind::Null => {
                self.cursor.advance();
                Ok(Expression::Literal(Value::Null))
            }
            TokenKind::Boolean => {
                self.cursor.advance();
                Ok(Expression::Literal(Value::Bool(token.value == "TRUE")))
            }
            TokenKind::Paren if token.value == "(" => {
                if self
                    .cursor
                    .peek(1)
                    .is_some_and(|t| t.clause() == Some(Clause::Select))
                {
                    let subquery = self.parse_subquery()?;
                    return Ok(Expression::Subquery(Box::new(subquery)));
                }
                self.cursor.advance();
                let expr = self.parse_or()?;
                self.cursor.expect(TokenKind::Paren, ")")?;
                Ok(expr)
            }
            TokenKind::Operator if token.value == "*" => {
                self.cursor.advance();
                Ok(Expression::Wildcard { table: None })
            }
            // keywords that double as function names
            TokenKind::Operator | TokenKind::Clause
                if matches!(token.value.as_str(), "MOD" | "VALUES")
                    && self.cursor.peek(1).is_some_and(|t| t.is(TokenKind::Paren, "(")) =>
            {
                self.cursor.advance();
                self.parse_function_call(token.value.clone())
            }
            TokenKind::Identifier => self.parse_identifier(token),
            _ => Err(SqlError::parse(format!(
                "Unexpected token '{}' in expression",
                token.raw
            ))),
        }
    }

    fn parse_identifier(&mut self, token: &'t Token) -> SqlResult<Expression> {
        self.cursor.advance();

        if self.cursor.check(TokenKind::Paren, "(") {
            return self.parse_function_call(token.value.clone());
        }

        // BINARY as a prefix operator: BINARY name
        if token.value.eq_ignore_ascii_case("BINARY")
            && self.cursor.current().is_some_and(|t| {
                matches!(
                    t.kind,
                    TokenKind::Identifier | TokenKind::StringLiteral | TokenKind::Numeric
                )
            })
        {
            let operand = self.parse_unary()?;
            return Ok(Expression::Function(FunctionExpression::new(
                "BINARY",
                vec![operand],
            )));
        }

        if self.cursor.check(TokenKind::Separator, ".") {
            self.cursor.advance();
            let next = self
                .cursor
                .current()
                .ok_or_else(|| SqlError::parse("expected column name after '.'"))?;
            return match next.kind {
                TokenKind::Identifier => {
                    self.cursor.advance();
                    Ok(Expression::Column(ColumnExpression::qualified(
                        token.value.clone(),
                        next.value.clone(),
                    )))
                }
                TokenKind::Operator if next.value == "*" => {
                    self.cursor.advance();
                    Ok(Expression::Wildcard {
                        table: Some(token.value.clone()),
                    })
                }
                _ => Err(SqlError::parse(format!(
                    "expected column name after '{}.'",
                    token.value
                ))),
            };
        }

        Ok(Expression::Column(ColumnExpression::new(token.value.clone())))
    }

    fn parse_function_call(&mut self, name: String) -> SqlResult<Expression> {
        let name = name.to_uppercase();
        self.cursor.expect(TokenKind::Paren, "(")?;

        // EXISTS(SELECT ...) and friends: the parens belong to the subquery
        if self.cursor.check_clause(Clause::Select) {
            let open = self.cursor.pos - 1;
            let close = find_closing_paren(self.cursor.tokens, open)?;
            let inner = &self.cursor.tokens[..close];
            let (_, query) = SelectParser::new(inner, self.cursor.sql, open + 1).parse()?;
            self.cursor.pos = close + 1;
            return Ok(Expression::Function(FunctionExpression {
                name,
                args: vec![Expression::Subquery(Box::new(query))],
                distinct: false,
            }));
        }

        let distinct = self.cursor.eat(TokenKind::Reserved, "DISTINCT");
        let args = self.parse_argument_list()?;

        if args.is_empty() && min_arity(&name).is_some_and(|min| min > 0) {
            return Err(SqlError::parse(format!(
                "{}() requires at least {} argument(s)",
                name,
                min_arity(&name).unwrap_or(1)
            )));
        }

        Ok(Expression::Function(FunctionExpression {
            name,
            args,
            distinct,
        }))
    }

    /// Comma-separated expressions up to and including the closing `)`.
    fn parse_argument_list(&mut self) -> SqlResult<Vec<Expression>> {
        let mut args = Vec::new();
        if self.cursor.eat(TokenKind::Paren, ")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.cursor.eat(TokenKind::Separator, ",") {
                continue;
            }
            self.cursor.expect(TokenKind::Paren, ")")?;
            return Ok(args);
        }
    }

    /// `( SELECT ... )` starting at the open paren.
    fn parse_subquery(&mut self) -> SqlResult<crate::ast::SelectQuery> {
        let open = self.cursor.pos;
        let close = find_closing_paren(self.cursor.tokens, open)?;
        let inner = &self.cursor.tokens[..close];
        let (_, query) = SelectParser::new(inner, self.cursor.sql, open + 1).parse()?;
        self.cursor.pos = close + 1;
        Ok(query)
    }
}

pub(crate) fn parse_number(text: &str) -> SqlResult<Value> {
    let is_float = text.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int(i));
        }
    }
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| SqlError::parse(format!("Invalid number '{}'", text)))
}
