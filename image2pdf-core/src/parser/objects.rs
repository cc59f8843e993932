//! PDF Object Parser
//!
//! Builds [`Object`] values from lexer tokens (ISO 32000-1 Section 7.3).
//! Streams are not handled here: their length may be an indirect object, so
//! the reader finishes them once it can resolve references.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object, ObjectId};

/// Maximum nesting of arrays and dictionaries before parsing gives up.
const MAX_DEPTH: usize = 64;

/// Parse one direct object.
pub fn parse_object(lexer: &mut Lexer<'_>) -> ParseResult<Object> {
    let token = lexer.next_token()?;
    parse_from_token(lexer, token, 0)
}

/// Parse a dictionary whose `<<` has already been consumed.
pub fn parse_dictionary_body(lexer: &mut Lexer<'_>) -> ParseResult<Dictionary> {
    parse_dictionary_inner(lexer, 0)
}

fn parse_from_token(lexer: &mut Lexer<'_>, token: Token, depth: usize) -> ParseResult<Object> {
    if depth > MAX_DEPTH {
        return Err(ParseError::SyntaxError {
            position: lexer.position(),
            message: "Objects nested too deeply".to_string(),
        });
    }

    match token {
        Token::Null => Ok(Object::Null),
        Token::Boolean(b) => Ok(Object::Boolean(b)),
        Token::Real(r) => Ok(Object::Real(r)),
        Token::String(s) => Ok(Object::String(s)),
        Token::Name(n) => Ok(Object::Name(n)),
        Token::Integer(i) => Ok(try_reference(lexer, i).unwrap_or(Object::Integer(i))),
        Token::ArrayStart => parse_array(lexer, depth),
        Token::DictStart => parse_dictionary_inner(lexer, depth).map(Object::Dictionary),
        Token::Eof => Err(ParseError::SyntaxError {
            position: lexer.position(),
            message: "Unexpected end of file".to_string(),
        }),
        other => Err(ParseError::UnexpectedToken {
            expected: "PDF object".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

/// Having read an integer, check whether it starts an `n g R` reference.
fn try_reference(lexer: &mut Lexer<'_>, number: i64) -> Option<Object> {
    let saved = lexer.position();
    let number = u32::try_from(number).ok()?;

    if let Ok(Token::Integer(generation)) = lexer.next_token() {
        if let Ok(generation) = u16::try_from(generation) {
            if let Ok(Token::R) = lexer.next_token() {
                return Some(Object::Reference(ObjectId::new(number, generation)));
            }
        }
    }

    lexer.set_position(saved);
    None
}

fn parse_array(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Object> {
    let mut elements = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::ArrayEnd => break,
            token => elements.push(parse_from_token(lexer, token, depth + 1)?),
        }
    }
    Ok(Object::Array(elements))
}

fn parse_dictionary_inner(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Dictionary> {
    let mut dict = Dictionary::new();
    loop {
        let key = match lexer.next_token()? {
            Token::DictEnd => break,
            Token::Name(name) => name,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "dictionary key".to_string(),
                    found: format!("{other:?}"),
                })
            }
        };
        let token = lexer.next_token()?;
        let value = parse_from_token(lexer, token, depth + 1)?;
        // A null value is equivalent to the key being absent
        if !value.is_null() {
            dict.set(key, value);
        }
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &[u8]) -> ParseResult<Object> {
        parse_object(&mut Lexer::new(input))
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            parse(b"12 0 R").unwrap(),
            Object::Reference(ObjectId::new(12, 0))
        );
    }

    #[test]
    fn test_integer_not_followed_by_reference() {
        let mut lexer = Lexer::new(b"0 0 100 50]");
        assert_eq!(parse_object(&mut lexer).unwrap(), Object::Integer(0));
        assert_eq!(parse_object(&mut lexer).unwrap(), Object::Integer(0));
        assert_eq!(parse_object(&mut lexer).unwrap(), Object::Integer(100));
    }

    #[test]
    fn test_parse_media_box_array() {
        assert_eq!(
            parse(b"[0 0 612.5 792]").unwrap(),
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(612.5),
                Object::Integer(792),
            ])
        );
    }

    #[test]
    fn test_parse_nested_dictionary() {
        let obj = parse(b"<< /Type /Page /Resources << /XObject << /Im0 5 0 R >> >> /Gone null >>")
            .unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_name("Type"), Some("Page"));
        assert!(!dict.contains_key("Gone"));

        let xobjects = dict
            .get_dict("Resources")
            .and_then(|r| r.get_dict("XObject"))
            .unwrap();
        assert_eq!(xobjects.get_reference("Im0"), Some(ObjectId::new(5, 0)));
    }

    #[test]
    fn test_bad_dictionary_key() {
        assert!(matches!(
            parse(b"<< 1 2 >>"),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_unexpected_eof() {
        assert!(parse(b"[1 2").is_err());
        assert!(parse(b"").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 5);
        assert!(parse(deep.as_bytes()).is_err());
    }
}
