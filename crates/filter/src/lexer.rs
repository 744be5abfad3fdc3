//! Tokenizer for the filter expression language.

use crate::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    Bang,
    EqEq,
    BangEq,
    AndAnd,
    OrOr,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// A token paired with its byte offset in the source, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn err(offset: usize, message: impl Into<String>) -> FilterError {
    FilterError::Parse {
        offset,
        message: message.into(),
    }
}

pub(crate) fn lex(source: &str) -> Result<Vec<Spanned>, FilterError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '.' => {
                tokens.push(Spanned { token: Token::Dot, offset: start });
                i += 1;
            }
            ',' => {
                tokens.push(Spanned { token: Token::Comma, offset: start });
                i += 1;
            }
            '(' => {
                tokens.push(Spanned { token: Token::LParen, offset: start });
                i += 1;
            }
            ')' => {
                tokens.push(Spanned { token: Token::RParen, offset: start });
                i += 1;
            }
            '[' => {
                tokens.push(Spanned { token: Token::LBracket, offset: start });
                i += 1;
            }
            ']' => {
                tokens.push(Spanned { token: Token::RBracket, offset: start });
                i += 1;
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::BangEq, offset: start });
                    i += 2;
                } else {
                    tokens.push(Spanned { token: Token::Bang, offset: start });
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Spanned { token: Token::EqEq, offset: start });
                    i += 2;
                } else {
                    return Err(err(start, "expected '==' (assignment is not supported)"));
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Spanned { token: Token::AndAnd, offset: start });
                    i += 2;
                } else {
                    return Err(err(start, "expected '&&'"));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Spanned { token: Token::OrOr, offset: start });
                    i += 2;
                } else {
                    return Err(err(start, "expected '||'"));
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match bytes.get(i).map(|b| *b as char) {
                        None => return Err(err(start, "unterminated string literal")),
                        Some(c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = bytes
                                .get(i + 1)
                                .map(|b| *b as char)
                                .ok_or_else(|| err(i, "dangling escape"))?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                '\\' => '\\',
                                '\'' => '\'',
                                '"' => '"',
                                other => return Err(err(i, format!("unknown escape '\\{other}'"))),
                            });
                            i += 2;
                        }
                        Some(_) => {
                            // Multi-byte characters are copied verbatim.
                            match source[i..].chars().next() {
                                Some(ch) => {
                                    value.push(ch);
                                    i += ch.len_utf8();
                                }
                                None => return Err(err(start, "unterminated string literal")),
                            }
                        }
                    }
                }
                tokens.push(Spanned { token: Token::Str(value), offset: start });
            }
            '0'..='9' | '-' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                let text = &source[i..j];
                let value: i64 = text
                    .parse()
                    .map_err(|_| err(start, format!("invalid integer {text:?}")))?;
                tokens.push(Spanned { token: Token::Int(value), offset: start });
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
                {
                    j += 1;
                }
                let ident = &source[i..j];
                let token = match ident {
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(ident.to_string()),
                };
                tokens.push(Spanned { token, offset: start });
                i = j;
            }
            other => return Err(err(start, format!("unexpected character {other:?}"))),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_operators_and_idents() {
        assert_eq!(
            kinds("req.x == 'v' && !res"),
            vec![
                Token::Ident("req".into()),
                Token::Dot,
                Token::Ident("x".into()),
                Token::EqEq,
                Token::Str("v".into()),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("res".into()),
            ]
        );
    }

    #[test]
    fn lexes_escapes_and_numbers() {
        assert_eq!(
            kinds(r#""a\"b" -42 true"#),
            vec![Token::Str("a\"b".into()), Token::Int(-42), Token::True]
        );
    }

    #[test]
    fn rejects_single_ampersand() {
        assert!(lex("a & b").is_err());
        assert!(lex("a = b").is_err());
        assert!(lex("'open").is_err());
    }
}
