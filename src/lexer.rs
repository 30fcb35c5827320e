//! SQL tokenizer.
//!
//! Turns statement text into `{kind, value, raw, offset}` tokens. Keywords are
//! upper-cased in `value`; quoted identifiers and string literals are
//! unescaped in `value` while `raw` keeps the source spelling.

use std::fmt;

use crate::error::{SqlError, SqlResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Numeric,
    StringLiteral,
    Null,
    Boolean,
    Identifier,
    Clause,
    Operator,
    Reserved,
    Paren,
    Separator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub raw: String,
    /// Byte offset of `raw` in the statement text
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, raw: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            raw: raw.into(),
            offset,
        }
    }

    pub fn is(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }

    /// Clause keyword carried by this token, if any.
    pub fn clause(&self) -> Option<Clause> {
        if self.kind == TokenKind::Clause {
            Clause::from_keyword(&self.value)
        } else {
            None
        }
    }

    /// Byte offset just past the end of `raw`.
    pub fn end_offset(&self) -> usize {
        self.offset + self.raw.len()
    }
}

/// Statement clause keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Update,
    Set,
    Delete,
    Insert,
    Values,
    OnDuplicateKeyUpdate,
}

impl Clause {
    pub fn from_keyword(keyword: &str) -> Option<Clause> {
        let clause = match keyword {
            "SELECT" => Clause::Select,
            "FROM" => Clause::From,
            "WHERE" => Clause::Where,
            "GROUP BY" => Clause::GroupBy,
            "HAVING" => Clause::Having,
            "ORDER BY" => Clause::OrderBy,
            "LIMIT" => Clause::Limit,
            "UPDATE" => Clause::Update,
            "SET" => Clause::Set,
            "DELETE" => Clause::Delete,
            "INSERT" => Clause::Insert,
            "VALUES" => Clause::Values,
            "ON DUPLICATE KEY UPDATE" => Clause::OnDuplicateKeyUpdate,
            _ => return None,
        };
        Some(clause)
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::From => "FROM",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
            Clause::Update => "UPDATE",
            Clause::Set => "SET",
            Clause::Delete => "DELETE",
            Clause::Insert => "INSERT",
            Clause::Values => "VALUES",
            Clause::OnDuplicateKeyUpdate => "ON DUPLICATE KEY UPDATE",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

const SINGLE_CLAUSES: &[&str] = &[
    "SELECT", "FROM", "WHERE", "HAVING", "LIMIT", "UPDATE", "SET", "DELETE", "INSERT", "VALUES",
];

const WORD_OPERATORS: &[&str] = &[
    "AND", "OR", "XOR", "NOT", "LIKE", "IN", "IS", "BETWEEN", "DIV", "MOD",
];

const RESERVED: &[&str] = &[
    "AS", "ON", "USING", "JOIN", "INNER", "LEFT", "RIGHT", "OUTER", "CROSS", "ASC", "DESC",
    "DISTINCT", "ALL", "INTO", "IGNORE", "USE", "FORCE", "INDEX", "KEY", "FOR", "OFFSET",
    "DUPLICATE", "BY", "GROUP", "ORDER",
];

pub struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            position: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).map(|(_, c)| *c)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position + 1).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.position)
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len())
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn slice_from(&self, start: usize) -> &'a str {
        &self.input[start..self.offset()]
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => self.advance(),
                Some('#') => self.skip_line(),
                // `--` opens a comment only when followed by whitespace
                Some('-') if self.peek() == Some('-') && self.dash_comment_follows() => {
                    self.skip_line()
                }
                Some('/') if self.peek() == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.current() {
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn dash_comment_follows(&self) -> bool {
        self.chars
            .get(self.position + 2)
            .map_or(true, |(_, c)| c.is_whitespace() || c.is_control())
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.current() {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.offset();
        let mut seen_dot = false;

        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !seen_dot && self.peek().is_some_and(|n| n.is_ascii_digit()) {
                seen_dot = true;
                self.advance();
            } else if (c == 'e' || c == 'E')
                && (self.peek().is_some_and(|n| n.is_ascii_digit())
                    || (matches!(self.peek(), Some('+') | Some('-'))
                        && self
                            .chars
                            .get(self.position + 2)
                            .is_some_and(|(_, n)| n.is_ascii_digit())))
            {
                self.advance();
                if matches!(self.current(), Some('+') | Some('-')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let raw = self.slice_from(start);
        Token::new(TokenKind::Numeric, raw, raw, start)
    }

    fn read_string(&mut self, quote: char) -> SqlResult<Token> {
        let start = self.offset();
        self.advance();
        let mut value = String::new();

        while let Some(c) = self.current() {
            if c == quote {
                if self.peek() == Some(quote) {
                    value.push(quote);
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                return Ok(Token::new(
                    TokenKind::StringLiteral,
                    value,
                    self.slice_from(start),
                    start,
                ));
            }
            if c == '\\' {
                self.advance();
                if let Some(escaped) = self.current() {
                    let ch = match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        // MySQL keeps the backslash for LIKE wildcards
                        '%' | '_' => {
                            value.push('\\');
                            escaped
                        }
                        other => other,
                    };
                    value.push(ch);
                    self.advance();
                }
                continue;
            }
            value.push(c);
            self.advance();
        }

        Err(SqlError::parse(format!(
            "Unterminated string starting at offset {}",
            start
        )))
    }

    fn read_quoted_identifier(&mut self) -> SqlResult<Token> {
        let start = self.offset();
        self.advance();
        let mut value = String::new();

        while let Some(c) = self.current() {
            if c == '`' {
                if self.peek() == Some('`') {
                    value.push('`');
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                return Ok(Token::new(
                    TokenKind::Identifier,
                    value,
                    self.slice_from(start),
                    start,
                ));
            }
            value.push(c);
            self.advance();
        }

        Err(SqlError::parse(format!(
            "Unterminated quoted identifier starting at offset {}",
            start
        )))
    }

    fn read_word(&mut self) -> String {
        let start = self.offset();
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                self.advance();
            } else {
                break;
            }
        }
        self.slice_from(start).to_string()
    }

    /// Consume `expected` if it is exactly the sequence of words that
    /// follows; otherwise leave the position untouched.
    fn merge_words(&mut self, expected: &[&str]) -> bool {
        let saved = self.position;
        for word in expected {
            self.skip_whitespace_and_comments();
            let matches = match self.current() {
                Some(c) if c.is_alphabetic() || c == '_' => {
                    self.read_word().eq_ignore_ascii_case(word)
                }
                _ => false,
            };
            if !matches {
                self.position = saved;
                return false;
            }
        }
        true
    }

    fn read_keyword_or_identifier(&mut self) -> Token {
        let start = self.offset();
        let word = self.read_word();
        let upper = word.to_uppercase();

        // multi-word clauses collapse into a single token
        let merged = match upper.as_str() {
            "GROUP" | "ORDER" if self.merge_words(&["BY"]) => Some(format!("{} BY", upper)),
            "ON" if self.merge_words(&["DUPLICATE", "KEY", "UPDATE"]) => {
                Some("ON DUPLICATE KEY UPDATE".to_string())
            }
            _ => None,
        };
        if let Some(keyword) = merged {
            return Token::new(TokenKind::Clause, keyword, self.slice_from(start), start);
        }

        let kind = if SINGLE_CLAUSES.contains(&upper.as_str()) {
            TokenKind::Clause
        } else if WORD_OPERATORS.contains(&upper.as_str()) {
            TokenKind::Operator
        } else if upper == "NULL" {
            TokenKind::Null
        } else if upper == "TRUE" || upper == "FALSE" {
            TokenKind::Boolean
        } else if RESERVED.contains(&upper.as_str()) {
            TokenKind::Reserved
        } else {
            return Token::new(TokenKind::Identifier, word.clone(), word, start);
        };

        Token::new(kind, upper, word, start)
    }

    fn read_symbol(&mut self) -> SqlResult<Token> {
        let start = self.offset();
        let c = self.current().unwrap_or_default();
        let next = self.peek();

        let (kind, len) = match (c, next) {
            ('<', Some('=')) if self.chars.get(self.position + 2).map(|(_, c)| *c) == Some('>') => {
                (TokenKind::Operator, 3)
            }
            ('<', Some('=')) | ('>', Some('=')) | ('!', Some('=')) | ('<', Some('>')) => {
                (TokenKind::Operator, 2)
            }
            ('&', Some('&')) | ('|', Some('|')) => (TokenKind::Operator, 2),
            ('=' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | '!', _) => (TokenKind::Operator, 1),
            ('(' | ')', _) => (TokenKind::Paren, 1),
            (',' | ';' | '.', _) => (TokenKind::Separator, 1),
            _ => {
                return Err(SqlError::parse(format!(
                    "Unexpected character '{}' at offset {}",
                    c, start
                )))
            }
        };

        for _ in 0..len {
            self.advance();
        }
        let raw = self.slice_from(start);
        Ok(Token::new(kind, raw, raw, start))
    }

    pub fn next_token(&mut self) -> SqlResult<Option<Token>> {
        self.skip_whitespace_and_comments();

        let token = match self.current() {
            None => return Ok(None),
            Some(c) if c.is_ascii_digit() => self.read_number(),
            Some('.') if self.peek().is_some_and(|n| n.is_ascii_digit()) => self.read_number(),
            Some(q @ ('\'' | '"')) => self.read_string(q)?,
            Some('`') => self.read_quoted_identifier()?,
            Some(c) if c.is_alphabetic() || c == '_' => self.read_keyword_or_identifier(),
            Some(_) => self.read_symbol()?,
        };

        Ok(Some(token))
    }

    pub fn tokenize(&mut self) -> SqlResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

/// Tokenize a statement.
pub fn tokenize(sql: &str) -> SqlResult<Vec<Token>> {
    Lexer::new(sql).tokenize()
}
