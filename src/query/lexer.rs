use crate::core::{DbError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword; keywords are matched case-insensitively by the parser.
    Ident(String),
    Integer(i64),
    Float(f64),
    Str(String),
    /// `:name`
    NamedParam(String),
    /// `?1`
    PositionalParam(usize),
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let token = match c {
            ',' => Token::Comma,
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' => Token::Eq,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '<' => match chars.get(pos + 1) {
                Some('=') => {
                    pos += 1;
                    Token::LtEq
                }
                Some('>') => {
                    pos += 1;
                    Token::NotEq
                }
                _ => Token::Lt,
            },
            '>' => match chars.get(pos + 1) {
                Some('=') => {
                    pos += 1;
                    Token::GtEq
                }
                _ => Token::Gt,
            },
            '!' => match chars.get(pos + 1) {
                Some('=') => {
                    pos += 1;
                    Token::NotEq
                }
                _ => return Err(DbError::ParseError(format!("Unexpected '!' at offset {}", pos))),
            },
            '\'' => {
                let (text, end) = read_string(&chars, pos)?;
                pos = end;
                tokens.push(Token::Str(text));
                continue;
            }
            ':' => {
                let end = scan_while(&chars, pos + 1, is_ident_char);
                if end == pos + 1 {
                    return Err(DbError::ParseError(format!("Parameter name expected at offset {}", pos)));
                }
                tokens.push(Token::NamedParam(chars[pos + 1..end].iter().collect()));
                pos = end;
                continue;
            }
            '?' => {
                let end = scan_while(&chars, pos + 1, |c| c.is_ascii_digit());
                let digits: String = chars[pos + 1..end].iter().collect();
                let index: usize = digits
                    .parse()
                    .map_err(|_| DbError::ParseError(format!("Positional parameter needs a number at offset {}", pos)))?;
                if index == 0 {
                    return Err(DbError::ParseError("Positional parameters start at ?1".into()));
                }
                tokens.push(Token::PositionalParam(index));
                pos = end;
                continue;
            }
            c if c.is_ascii_digit() => {
                let (token, end) = read_number(&chars, pos)?;
                pos = end;
                tokens.push(token);
                continue;
            }
            c if is_ident_start(c) => {
                let end = scan_while(&chars, pos, is_ident_char);
                tokens.push(Token::Ident(chars[pos..end].iter().collect()));
                pos = end;
                continue;
            }
            other => {
                return Err(DbError::ParseError(format!(
                    "Unexpected character '{}' at offset {}",
                    other, pos
                )));
            }
        };
        tokens.push(token);
        pos += 1;
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn scan_while(chars: &[char], start: usize, pred: impl Fn(char) -> bool) -> usize {
    let mut end = start;
    while end < chars.len() && pred(chars[end]) {
        end += 1;
    }
    end
}

/// `'it''s'` reads as `it's`.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut text = String::new();
    let mut pos = start + 1;
    loop {
        match chars.get(pos) {
            Some('\'') if chars.get(pos + 1) == Some(&'\'') => {
                text.push('\'');
                pos += 2;
            }
            Some('\'') => return Ok((text, pos + 1)),
            Some(c) => {
                text.push(*c);
                pos += 1;
            }
            None => {
                return Err(DbError::ParseError(format!(
                    "Unterminated string literal starting at offset {}",
                    start
                )));
            }
        }
    }
}

fn read_number(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut end = scan_while(chars, start, |c| c.is_ascii_digit());
    let is_float = chars.get(end) == Some(&'.') && chars.get(end + 1).is_some_and(|c| c.is_ascii_digit());
    if is_float {
        end = scan_while(chars, end + 1, |c| c.is_ascii_digit());
    }
    let text: String = chars[start..end].iter().collect();
    let token = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| DbError::ParseError(format!("Invalid number '{}'", text)))?,
        )
    } else {
        Token::Integer(
            text.parse()
                .map_err(|_| DbError::ParseError(format!("Invalid number '{}'", text)))?,
        )
    };
    // Java-style suffixes: 10L, 1.5D
    if chars.get(end).is_some_and(|c| matches!(c, 'L' | 'l' | 'D' | 'd' | 'F' | 'f')) {
        end += 1;
    }
    Ok((token, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_select() {
        let tokens = tokenize("SELECT m FROM Member m WHERE m.age >= :age AND m.name <> 'it''s'").unwrap();
        assert_eq!(tokens[0], Token::Ident("SELECT".into()));
        assert!(tokens.contains(&Token::GtEq));
        assert!(tokens.contains(&Token::NamedParam("age".into())));
        assert!(tokens.contains(&Token::NotEq));
        assert!(tokens.contains(&Token::Str("it's".into())));
        assert_eq!(tokens.last(), Some(&Token::Eof));
    }

    #[test]
    fn test_numbers_and_positional_params() {
        let tokens = tokenize("?1 10 2.5 7L").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::PositionalParam(1),
                Token::Integer(10),
                Token::Float(2.5),
                Token::Integer(7),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(tokenize("'open"), Err(DbError::ParseError(_))));
        assert!(matches!(tokenize("?0"), Err(DbError::ParseError(_))));
        assert!(matches!(tokenize("a # b"), Err(DbError::ParseError(_))));
    }
}
