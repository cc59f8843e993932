//! PDF Lexer
//!
//! Tokenizes PDF syntax (ISO 32000-1 Section 7.2) from an in-memory buffer.

use super::{ParseError, ParseResult};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Literal or hexadecimal string, already unescaped
    String(Vec<u8>),
    /// Name without the leading slash, `#xx` escapes resolved
    Name(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Null,
    Obj,
    EndObj,
    Stream,
    EndStream,
    /// The `R` of an indirect reference
    R,
    /// Any other bare word (`xref`, `trailer`, `startxref`, `n`, `f`, ...)
    Keyword(String),
    Eof,
}

pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Start lexing at `position`.
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Return the next token without consuming it.
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let saved = self.position;
        let token = self.next_token();
        self.position = saved;
        token
    }

    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace_and_comments();

        let ch = match self.data.get(self.position) {
            Some(&ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => {
                if self.data.get(self.position + 1) == Some(&b'<') {
                    self.position += 2;
                    Ok(Token::DictStart)
                } else {
                    self.read_hex_string()
                }
            }
            b'>' => {
                if self.data.get(self.position + 1) == Some(&b'>') {
                    self.position += 2;
                    Ok(Token::DictEnd)
                } else {
                    Err(self.syntax_error("Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.position += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.position += 1;
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ if is_regular(ch) => self.read_keyword(),
            _ => Err(self.syntax_error(&format!("Unexpected character: {}", ch as char))),
        }
    }

    /// Skip whitespace and `%` comments.
    pub fn skip_whitespace_and_comments(&mut self) {
        while let Some(&ch) = self.data.get(self.position) {
            if is_whitespace(ch) {
                self.position += 1;
            } else if ch == b'%' {
                while let Some(&c) = self.data.get(self.position) {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.position += 1;
                }
            } else {
                break;
            }
        }
    }

    fn take_regular(&mut self) -> &'a [u8] {
        let start = self.position;
        while let Some(&ch) = self.data.get(self.position) {
            if !is_regular(ch) {
                break;
            }
            self.position += 1;
        }
        &self.data[start..self.position]
    }

    fn read_keyword(&mut self) -> ParseResult<Token> {
        let word = self.take_regular();
        Ok(match word {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            b"obj" => Token::Obj,
            b"endobj" => Token::EndObj,
            b"stream" => Token::Stream,
            b"endstream" => Token::EndStream,
            b"R" => Token::R,
            other => Token::Keyword(String::from_utf8_lossy(other).into_owned()),
        })
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let text = self.take_regular();
        let text = std::str::from_utf8(text).map_err(|_| ParseError::SyntaxError {
            position: start,
            message: "Invalid number".to_string(),
        })?;

        let invalid = || ParseError::SyntaxError {
            position: start,
            message: format!("Invalid number: {text}"),
        };

        if text.contains('.') {
            // PDF allows "-.5" and "4."; Rust's parser accepts both
            text.parse::<f64>().map(Token::Real).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(Token::Integer).map_err(|_| invalid())
        }
    }

    fn read_name(&mut self) -> ParseResult<Token> {
        self.position += 1; // '/'
        let raw = self.take_regular();
        let mut bytes = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'#' && i + 2 < raw.len() {
                if let (Some(hi), Some(lo)) = (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                    bytes.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
            }
            bytes.push(raw[i]);
            i += 1;
        }
        Ok(Token::Name(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.position += 1; // '('
        let mut out = Vec::new();
        let mut depth = 1usize;

        loop {
            let ch = match self.data.get(self.position) {
                Some(&ch) => ch,
                None => {
                    return Err(ParseError::SyntaxError {
                        position: start,
                        message: "Unterminated string".to_string(),
                    })
                }
            };
            self.position += 1;

            match ch {
                b'(' => {
                    depth += 1;
                    out.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(ch);
                }
                b'\\' => self.read_escape(&mut out),
                b'\r' => {
                    // Unescaped end-of-line is always a single LF
                    if self.data.get(self.position) == Some(&b'\n') {
                        self.position += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(ch),
            }
        }

        Ok(Token::String(out))
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) {
        let ch = match self.data.get(self.position) {
            Some(&ch) => ch,
            None => return,
        };
        self.position += 1;

        match ch {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = (ch - b'0') as u16;
                for _ in 0..2 {
                    match self.data.get(self.position) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u16;
                            self.position += 1;
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            b'\r' => {
                // Line continuation
                if self.data.get(self.position) == Some(&b'\n') {
                    self.position += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }

    fn read_hex_string(&mut self) -> ParseResult<Token> {
        let start = self.position;
        self.position += 1; // '<'
        let mut nibbles = Vec::new();

        loop {
            let ch = match self.data.get(self.position) {
                Some(&ch) => ch,
                None => {
                    return Err(ParseError::SyntaxError {
                        position: start,
                        message: "Unterminated hex string".to_string(),
                    })
                }
            };
            self.position += 1;

            if ch == b'>' {
                break;
            }
            if is_whitespace(ch) {
                continue;
            }
            match hex_value(ch) {
                Some(v) => nibbles.push(v),
                None => {
                    return Err(ParseError::SyntaxError {
                        position: self.position - 1,
                        message: format!("Invalid hex digit: {}", ch as char),
                    })
                }
            }
        }

        if nibbles.len() % 2 == 1 {
            nibbles.push(0);
        }
        let bytes = nibbles.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect();
        Ok(Token::String(bytes))
    }

    fn syntax_error(&self, message: &str) -> ParseError {
        ParseError::SyntaxError {
            position: self.position,
            message: message.to_string(),
        }
    }
}

pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, 0 | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(ch: u8) -> bool {
    !is_whitespace(ch) && !is_delimiter(ch)
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}
