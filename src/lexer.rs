//! Lexer for iXML grammar syntax
//!
//! Converts grammar text into a stream of positioned tokens, skipping
//! whitespace and `{...}` comments. A comment that opens with `{[` and closes
//! with `]}` is a pragma and becomes a [`Token::Pragma`].

use crate::error::{IxmlError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    String(String),
    /// Digits of a `#hex` character, without the `#`
    Hex(String),
    Pragma { name: String, data: String },
    Colon,
    Equals,
    Period,
    Semicolon,
    Pipe,
    Comma,
    Plus,
    DoublePlus,
    Star,
    DoubleStar,
    Question,
    At,
    Minus,
    Caret,
    Tilde,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// A token together with the line and column it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();

        loop {
            if let Some(pragma) = self.skip_whitespace_and_comments()? {
                tokens.push(pragma);
                continue;
            }
            if self.pos >= self.input.len() {
                break;
            }
            let (line, column) = (self.line, self.column);
            let token = self.next_token()?;
            tokens.push(Spanned {
                token,
                line,
                column,
            });
        }

        Ok(tokens)
    }

    fn error(&self, message: impl Into<String>) -> IxmlError {
        IxmlError::Syntax {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    /// Skips whitespace and comments; stops early when a pragma was read
    fn skip_whitespace_and_comments(&mut self) -> Result<Option<Spanned>> {
        loop {
            while self.peek().is_some_and(|c| c.is_whitespace()) {
                self.advance();
            }

            if self.peek() != Some('{') {
                return Ok(None);
            }
            if self.peek_at(1) == Some('[') {
                return self.read_pragma().map(Some);
            }
            self.skip_comment()?;
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        // iXML comments are {like this} and can be nested
        self.advance();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some('{') => depth += 1,
                Some('}') => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("Unclosed comment")),
            }
        }

        Ok(())
    }

    fn read_pragma(&mut self) -> Result<Spanned> {
        let (line, column) = (self.line, self.column);
        self.advance(); // '{'
        self.advance(); // '['

        let mut body = String::new();
        loop {
            match self.peek() {
                Some(']') if self.peek_at(1) == Some('}') => {
                    self.advance();
                    self.advance();
                    break;
                }
                Some(ch) => {
                    body.push(ch);
                    self.advance();
                }
                None => return Err(self.error("Unclosed pragma")),
            }
        }

        let body = body.trim();
        let (name, data) = match body.find(char::is_whitespace) {
            Some(split) => (&body[..split], body[split..].trim()),
            None => (body, ""),
        };
        if name.is_empty() {
            return Err(IxmlError::Syntax {
                message: "Pragma without a name".to_string(),
                line,
                column,
            });
        }

        Ok(Spanned {
            token: Token::Pragma {
                name: name.to_string(),
                data: data.to_string(),
            },
            line,
            column,
        })
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.advance();
        Ok(token)
    }

    fn next_token(&mut self) -> Result<Token> {
        match self.peek() {
            Some('"') => self.read_quoted('"'),
            Some('\'') => self.read_quoted('\''),
            Some('#') => self.read_hex(),
            Some(':') => self.single(Token::Colon),
            Some('=') => self.single(Token::Equals),
            Some('.') => self.single(Token::Period),
            Some(';') => self.single(Token::Semicolon),
            Some('|') => self.single(Token::Pipe),
            Some(',') => self.single(Token::Comma),
            Some('+') if self.peek_at(1) == Some('+') => {
                self.advance();
                self.single(Token::DoublePlus)
            }
            Some('+') => self.single(Token::Plus),
            Some('*') if self.peek_at(1) == Some('*') => {
                self.advance();
                self.single(Token::DoubleStar)
            }
            Some('*') => self.single(Token::Star),
            Some('?') => self.single(Token::Question),
            Some('@') => self.single(Token::At),
            Some('-') => self.single(Token::Minus),
            Some('^') => self.single(Token::Caret),
            Some('~') => self.single(Token::Tilde),
            Some('(') => self.single(Token::LParen),
            Some(')') => self.single(Token::RParen),
            Some('[') => self.single(Token::LBracket),
            Some(']') => self.single(Token::RBracket),
            Some(ch) if ch.is_alphabetic() || ch == '_' => Ok(self.read_ident()),
            Some(ch) => Err(self.error(format!("Unexpected character: {}", ch))),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn read_quoted(&mut self, quote: char) -> Result<Token> {
        self.advance(); // opening quote
        let mut s = String::new();

        while let Some(ch) = self.advance() {
            if ch == quote {
                // A doubled quote stands for the quote character itself
                if self.peek() == Some(quote) {
                    s.push(quote);
                    self.advance();
                } else {
                    return Ok(Token::String(s));
                }
            } else if ch == '\n' {
                return Err(self.error("Line break inside string"));
            } else {
                s.push(ch);
            }
        }

        Err(self.error("Unterminated string"))
    }

    fn read_hex(&mut self) -> Result<Token> {
        self.advance(); // '#'
        let mut digits = String::new();
        while let Some(ch) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
            digits.push(ch);
            self.advance();
        }
        if digits.is_empty() {
            return Err(self.error("Expected hexadecimal digits after '#'"));
        }
        Ok(Token::Hex(digits))
    }

    fn read_ident(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == '·' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::Ident(ident)
    }
}
