//! Python-literal parsing for `attrs` values.
//!
//! The legacy `attrs` attribute holds a Python dict literal mapping attribute
//! names to domains. Its operands are not always literals: field references
//! (`parent.state`), context lookups (`context.get('default_type', False)`)
//! and `%(xml_id)d` placeholders appear in real modules. Those parse into
//! [`Value::Opaque`] leaves carried verbatim, so no substitute/evaluate/
//! restore round-trip is needed.

use super::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiteralError {
    #[error("unexpected character {ch:?} at byte {at}")]
    UnexpectedChar { ch: char, at: usize },

    #[error("unterminated string literal starting at byte {at}")]
    UnterminatedString { at: usize },

    #[error("unbalanced bracket in expression starting at byte {at}")]
    UnbalancedBracket { at: usize },

    #[error("expected {expected} at byte {at}")]
    Unexpected { expected: &'static str, at: usize },

    #[error("trailing input at byte {at}")]
    TrailingInput { at: usize },

    #[error("unexpected end of input")]
    UnexpectedEof,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    NoneLit,
    Opaque(String),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    at: usize,
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, LiteralError> {
        let mut tokens = Vec::new();
        while let Some(&b) = self.bytes.get(self.pos) {
            let at = self.pos;
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                    continue;
                }
                b'{' => self.push_simple(&mut tokens, Token::LBrace),
                b'}' => self.push_simple(&mut tokens, Token::RBrace),
                b'[' => self.push_simple(&mut tokens, Token::LBracket),
                b']' => self.push_simple(&mut tokens, Token::RBracket),
                b'(' => self.push_simple(&mut tokens, Token::LParen),
                b')' => self.push_simple(&mut tokens, Token::RParen),
                b':' => self.push_simple(&mut tokens, Token::Colon),
                b',' => self.push_simple(&mut tokens, Token::Comma),
                b'\'' | b'"' => {
                    let token = self.lex_string()?;
                    tokens.push(Spanned { token, at });
                }
                b'-' | b'0'..=b'9' => {
                    let token = self.lex_number(at)?;
                    tokens.push(Spanned { token, at });
                }
                b'%' => {
                    let token = self.lex_placeholder(at)?;
                    tokens.push(Spanned { token, at });
                }
                b'_' | b'A'..=b'Z' | b'a'..=b'z' => {
                    let token = self.lex_name(at)?;
                    tokens.push(Spanned { token, at });
                }
                _ => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                    return Err(LiteralError::UnexpectedChar { ch, at });
                }
            }
        }
        Ok(tokens)
    }

    fn push_simple(&mut self, tokens: &mut Vec<Spanned>, token: Token) {
        tokens.push(Spanned {
            token,
            at: self.pos,
        });
        self.pos += 1;
    }

    fn lex_string(&mut self) -> Result<Token, LiteralError> {
        let start = self.pos;
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let mut out = String::new();
        while let Some(&b) = self.bytes.get(self.pos) {
            if b == quote {
                self.pos += 1;
                return Ok(Token::Str(out));
            }
            if b == b'\\' {
                match self.bytes.get(self.pos + 1) {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b'\\') => out.push('\\'),
                    Some(b'\'') => out.push('\''),
                    Some(b'"') => out.push('"'),
                    Some(&other) => {
                        // Unknown escape: Python keeps the backslash.
                        out.push('\\');
                        out.push(other as char);
                    }
                    None => return Err(LiteralError::UnterminatedString { at: start }),
                }
                self.pos += 2;
            } else {
                let ch = self.src[self.pos..].chars().next().unwrap();
                out.push(ch);
                self.pos += ch.len_utf8();
            }
        }
        Err(LiteralError::UnterminatedString { at: start })
    }

    fn lex_number(&mut self, at: usize) -> Result<Token, LiteralError> {
        let start = self.pos;
        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
            if !matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
                return Err(LiteralError::Unexpected {
                    expected: "digit after '-'",
                    at,
                });
            }
        }
        while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.bytes.get(self.pos) == Some(&b'.')
            && matches!(self.bytes.get(self.pos + 1), Some(b'0'..=b'9'))
        {
            is_float = true;
            self.pos += 1;
            while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| LiteralError::Unexpected {
                    expected: "float literal",
                    at,
                })
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| LiteralError::Unexpected {
                    expected: "integer literal",
                    at,
                })
        }
    }

    /// `%(xml_id)d` placeholders, substituted by the framework before the
    /// expression is ever evaluated.
    fn lex_placeholder(&mut self, at: usize) -> Result<Token, LiteralError> {
        let start = self.pos;
        self.pos += 1;
        if self.bytes.get(self.pos) != Some(&b'(') {
            return Err(LiteralError::Unexpected {
                expected: "'(' after '%'",
                at,
            });
        }
        self.pos += 1;
        while matches!(
            self.bytes.get(self.pos),
            Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.')
        ) {
            self.pos += 1;
        }
        if self.bytes.get(self.pos) != Some(&b')') || self.bytes.get(self.pos + 1) != Some(&b'd') {
            return Err(LiteralError::Unexpected {
                expected: "')d' closing a placeholder",
                at,
            });
        }
        self.pos += 2;
        Ok(Token::Opaque(self.src[start..self.pos].to_string()))
    }

    /// An identifier chain: dotted path with optional balanced call or
    /// subscript suffixes. Bare `True`/`False`/`None` stay keywords;
    /// everything else is an opaque expression leaf.
    fn lex_name(&mut self, at: usize) -> Result<Token, LiteralError> {
        let start = self.pos;
        self.consume_ident();
        let mut suffixed = false;
        loop {
            match self.bytes.get(self.pos) {
                Some(b'.')
                    if matches!(
                        self.bytes.get(self.pos + 1),
                        Some(b'A'..=b'Z' | b'a'..=b'z' | b'_')
                    ) =>
                {
                    self.pos += 1;
                    self.consume_ident();
                    suffixed = true;
                }
                Some(b'(') => {
                    self.consume_balanced(b'(', b')', at)?;
                    suffixed = true;
                }
                Some(b'[') => {
                    self.consume_balanced(b'[', b']', at)?;
                    suffixed = true;
                }
                _ => break,
            }
        }
        let text = &self.src[start..self.pos];
        if !suffixed {
            match text {
                "True" => return Ok(Token::True),
                "False" => return Ok(Token::False),
                "None" => return Ok(Token::NoneLit),
                _ => {}
            }
        }
        Ok(Token::Opaque(text.to_string()))
    }

    fn consume_ident(&mut self) {
        while matches!(
            self.bytes.get(self.pos),
            Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
        ) {
            self.pos += 1;
        }
    }

    /// Consume a bracketed group, respecting nested brackets and strings.
    fn consume_balanced(&mut self, open: u8, close: u8, at: usize) -> Result<(), LiteralError> {
        let mut depth = 0usize;
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'\'' | b'"' => {
                    self.lex_string()?;
                    continue;
                }
                _ if b == open => depth += 1,
                _ if b == close => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(LiteralError::UnbalancedBracket { at })
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn at(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.at).unwrap_or(usize::MAX)
    }

    fn next(&mut self) -> Result<Token, LiteralError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|s| s.token.clone())
            .ok_or(LiteralError::UnexpectedEof)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), LiteralError> {
        let at = self.at();
        if self.next()? == token {
            Ok(())
        } else {
            Err(LiteralError::Unexpected { expected, at })
        }
    }

    fn parse_value(&mut self) -> Result<Value, LiteralError> {
        let at = self.at();
        match self.next()? {
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::NoneLit => Ok(Value::None),
            Token::Opaque(text) => Ok(Value::Opaque(text)),
            Token::LBracket => self.parse_sequence(Token::RBracket).map(Value::List),
            Token::LParen => {
                let (items, trailing_comma) = self.parse_sequence_counted(Token::RParen)?;
                // `('x')` is a parenthesized scalar in Python, not a tuple.
                if items.len() == 1 && !trailing_comma {
                    Ok(items.into_iter().next().unwrap())
                } else {
                    Ok(Value::List(items))
                }
            }
            _ => Err(LiteralError::Unexpected {
                expected: "a literal value",
                at,
            }),
        }
    }

    fn parse_sequence(&mut self, close: Token) -> Result<Vec<Value>, LiteralError> {
        self.parse_sequence_counted(close).map(|(items, _)| items)
    }

    fn parse_sequence_counted(
        &mut self,
        close: Token,
    ) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.peek() == Some(&close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.parse_value()?);
            trailing_comma = false;
            match self.peek() {
                Some(Token::Comma) => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(t) if *t == close => {}
                _ => {
                    return Err(LiteralError::Unexpected {
                        expected: "',' or closing bracket",
                        at: self.at(),
                    })
                }
            }
        }
    }

    fn parse_mapping(&mut self) -> Result<Vec<(String, Value)>, LiteralError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut pairs = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBrace) {
                self.pos += 1;
                return Ok(pairs);
            }
            let at = self.at();
            let key = match self.next()? {
                Token::Str(s) => s,
                _ => {
                    return Err(LiteralError::Unexpected {
                        expected: "a string key",
                        at,
                    })
                }
            };
            self.expect(Token::Colon, "':'")?;
            let value = self.parse_value()?;
            pairs.push((key, value));
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBrace) => {}
                _ => {
                    return Err(LiteralError::Unexpected {
                        expected: "',' or '}'",
                        at: self.at(),
                    })
                }
            }
        }
    }

    fn expect_eof(&self) -> Result<(), LiteralError> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(s) => Err(LiteralError::TrailingInput { at: s.at }),
        }
    }
}

/// Parse a single Python-literal value.
pub fn parse_value(src: &str) -> Result<Value, LiteralError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_value()?;
    parser.expect_eof()?;
    Ok(value)
}

/// Parse an `attrs` dict literal into its key/value pairs.
pub fn parse_mapping(src: &str) -> Result<Vec<(String, Value)>, LiteralError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let pairs = parser.parse_mapping()?;
    parser.expect_eof()?;
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_literals() {
        assert_eq!(parse_value("42").unwrap(), Value::Int(42));
        assert_eq!(parse_value("-1").unwrap(), Value::Int(-1));
        assert_eq!(parse_value("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(parse_value("True").unwrap(), Value::Bool(true));
        assert_eq!(parse_value("None").unwrap(), Value::None);
        assert_eq!(
            parse_value("'done'").unwrap(),
            Value::Str("done".to_string())
        );
        assert_eq!(parse_value("\"done\"").unwrap(), Value::Str("done".to_string()));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse_value(r"'it\'s'").unwrap(),
            Value::Str("it's".to_string())
        );
        assert_eq!(
            parse_value(r"'a\\b'").unwrap(),
            Value::Str("a\\b".to_string())
        );
    }

    #[test]
    fn tuple_and_list_both_become_lists() {
        let triple = parse_value("('state', '=', 'done')").unwrap();
        assert_eq!(
            triple,
            Value::List(vec![
                Value::Str("state".to_string()),
                Value::Str("=".to_string()),
                Value::Str("done".to_string()),
            ])
        );
        let list = parse_value("['state', '=', 'done']").unwrap();
        assert_eq!(triple, list);
    }

    #[test]
    fn parenthesized_scalar_is_not_a_tuple() {
        assert_eq!(parse_value("('x')").unwrap(), Value::Str("x".to_string()));
        assert_eq!(
            parse_value("('x',)").unwrap(),
            Value::List(vec![Value::Str("x".to_string())])
        );
    }

    #[test]
    fn dotted_reference_is_opaque() {
        assert_eq!(
            parse_value("parent.state").unwrap(),
            Value::Opaque("parent.state".to_string())
        );
    }

    #[test]
    fn call_chain_is_opaque_with_suffix() {
        assert_eq!(
            parse_value("context.get('default_type', False)").unwrap(),
            Value::Opaque("context.get('default_type', False)".to_string())
        );
    }

    #[test]
    fn placeholder_is_opaque() {
        assert_eq!(
            parse_value("%(base.group_user)d").unwrap(),
            Value::Opaque("%(base.group_user)d".to_string())
        );
    }

    #[test]
    fn bare_identifier_is_opaque_but_keywords_are_not() {
        assert_eq!(
            parse_value("active_id").unwrap(),
            Value::Opaque("active_id".to_string())
        );
        assert_eq!(parse_value("False").unwrap(), Value::Bool(false));
    }

    #[test]
    fn attrs_mapping_round_trip() {
        let pairs =
            parse_mapping("{'invisible': [('state', '=', 'done')], 'required': True}").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "invisible");
        assert_eq!(pairs[1].1, Value::Bool(true));
    }

    #[test]
    fn mapping_with_trailing_comma() {
        let pairs = parse_mapping("{'invisible': True,}").unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn empty_mapping() {
        assert!(parse_mapping("{}").unwrap().is_empty());
    }

    #[test]
    fn mapping_with_opaque_operand() {
        let pairs = parse_mapping("{'invisible': [('company_id', '!=', parent.company_id)]}")
            .unwrap();
        let Value::List(terms) = &pairs[0].1 else {
            panic!("expected a domain list");
        };
        let Value::List(triple) = &terms[0] else {
            panic!("expected a leaf triple");
        };
        assert_eq!(triple[2], Value::Opaque("parent.company_id".to_string()));
    }

    #[test]
    fn unterminated_string_is_reported_with_position() {
        let err = parse_value("'oops").unwrap_err();
        assert!(matches!(err, LiteralError::UnterminatedString { at: 0 }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_value("@").is_err());
        assert!(parse_mapping("{'a' 'b'}").is_err());
        assert!(parse_value("[1, 2").is_err());
    }
}
