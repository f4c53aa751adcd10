// src/parser.rs
use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    InvalidSyntax(String),
}

impl From<String> for ParseError {
    fn from(msg: String) -> Self {
        ParseError::InvalidSyntax(msg)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidSyntax(msg) => f.write_str(msg),
        }
    }
}

/// Character cursor shared by the expression parser.
pub struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Parser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    /// Build a syntax error tagged with the current position.
    pub fn error(&self, msg: impl std::fmt::Display) -> ParseError {
        ParseError::InvalidSyntax(format!("{msg} at position {}", self.i))
    }

    pub fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("identifier expected"));
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// `` `any name` `` – field names that are not plain identifiers.
    pub fn parse_backtick_name(&mut self) -> Result<String, ParseError> {
        self.expect('`')?;
        let name = self.capture_until('`')?;
        self.expect('`')?;
        if name.is_empty() {
            return Err(self.error("empty quoted name"));
        }
        Ok(name.to_string())
    }

    pub fn parse_number_literal(&mut self) -> Result<Number, ParseError> {
        let start = self.i;
        let mut is_float = false;
        self.skip_digits();
        if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.i += 1;
            self.skip_digits();
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            is_float = true;
            self.i += 1;
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.i += 1;
            }
            self.skip_digits();
        }
        let s = &self.s[start..self.i];
        if s.is_empty() {
            return Err(self.error("number expected"));
        }
        if !is_float {
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Number::from(i));
            }
        }
        let f: f64 = s.parse().map_err(|_| self.error("bad number"))?;
        Number::from_f64(f).ok_or_else(|| self.error("number out of range"))
    }

    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        let quote = self.peek_char().ok_or_else(|| self.error("string expected"))?;
        if quote != '\'' && quote != '"' {
            return Err(self.error("expected quoted string"));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                let Some(nc) = self.peek_char() else { break };
                self.i += nc.len_utf8();
                match nc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    '/' => out.push('/'),
                    'u' => out.push(self.parse_unicode_escape()?),
                    _ => {
                        out.push('\\');
                        out.push(nc);
                    }
                }
            } else {
                out.push(c);
            }
        }
        Err(self.error("unterminated string"))
    }

    /// `XXXX` after `\u`; a high surrogate must be followed by `\uDC00`..`\uDFFF`.
    fn parse_unicode_escape(&mut self) -> Result<char, ParseError> {
        let high = self.parse_hex4()?;
        if !(0xD800..=0xDBFF).contains(&high) {
            return char::from_u32(high).ok_or_else(|| self.error("invalid unicode code point"));
        }
        if !self.consume_str("\\u") {
            return Err(self.error("unpaired surrogate in unicode escape"));
        }
        let low = self.parse_hex4()?;
        if !(0xDC00..=0xDFFF).contains(&low) {
            return Err(self.error("unpaired surrogate in unicode escape"));
        }
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode code point"))
    }

    fn parse_hex4(&mut self) -> Result<u32, ParseError> {
        let hex = self
            .s
            .get(self.i..self.i + 4)
            .ok_or_else(|| self.error("truncated unicode escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("bad unicode escape"))?;
        self.i += 4;
        Ok(code)
    }

    pub fn capture_until(&mut self, end: char) -> Result<&'a str, ParseError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == end {
                break;
            }
            self.i += c.len_utf8();
        }
        if self.peek_char() != Some(end) {
            return Err(self.error(format!("expected '{end}'")));
        }
        Ok(&self.s[start..self.i])
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    /// Consume `word` only when it is not the prefix of a longer identifier.
    pub fn consume_keyword(&mut self, word: &str) -> bool {
        if !self.peek_str(word) {
            return false;
        }
        let next = self.s[self.i + word.len()..].chars().next();
        if next.is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            return false;
        }
        self.i += word.len();
        true
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.s[self.i..].chars().nth(n)
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else if self.peek_str("/*") {
                match self.s[self.i + 2..].find("*/") {
                    Some(end) => self.i += end + 4,
                    None => self.i = self.s.len(),
                }
            } else {
                break;
            }
        }
    }

    fn skip_digits(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn number(text: &str) -> Value {
        Value::Number(Parser::new(text).parse_number_literal().unwrap())
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(number("42"), json!(42));
        assert_eq!(number("2.5"), json!(2.5));
        assert_eq!(number("1e2"), json!(100.0));
        assert_eq!(
            Parser::new(r#""a\"b\u0041""#).parse_quoted_string().unwrap(),
            "a\"bA"
        );
    }

    #[test]
    fn surrogate_pairs_combine() {
        assert_eq!(
            Parser::new(r#""\uD83D\uDE00!""#).parse_quoted_string().unwrap(),
            "\u{1F600}!"
        );
        assert!(Parser::new(r#""\uD83D x""#).parse_quoted_string().is_err());
        assert!(Parser::new(r#""\uD83D\u0041""#).parse_quoted_string().is_err());
        assert!(Parser::new(r#""\uDE00""#).parse_quoted_string().is_err());
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = Parser::new("'abc").parse_quoted_string().unwrap_err();
        assert_eq!(err, ParseError::InvalidSyntax("unterminated string at position 4".into()));
    }

    #[test]
    fn keyword_needs_boundary() {
        let mut p = Parser::new("order");
        assert!(!p.consume_keyword("or"));
        let mut p = Parser::new("or x");
        assert!(p.consume_keyword("or"));
    }

    #[test]
    fn comments_are_whitespace() {
        let mut p = Parser::new("  /* note */ x");
        p.skip_ws();
        assert_eq!(p.peek_char(), Some('x'));
    }
}
