//! Tokenizer for condition expressions.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ExpressionError;

/// Pattern of a cross-step reference: `{{@<nodeId>:<label>.<field...>}}`.
///
/// Group 1 is the raw node id, group 2 the label plus optional field path.
pub static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{@([^:]+):([^}]+)\}\}").expect("reference pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// A reference token, kept as its source text
    Reference(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Bang,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {}", n),
            Self::Str(_) => "string literal".to_string(),
            Self::Ident(name) => format!("identifier '{}'", name),
            Self::Reference(text) => format!("reference {}", text),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Bang => "!",
            Self::EqEq => "==",
            Self::EqEqEq => "===",
            Self::NotEq => "!=",
            Self::NotEqEq => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            _ => "?",
        }
    }
}

/// Splits an expression into tokens.
///
/// Anything outside the token set (assignment, semicolons, braces,
/// template literals, arrow functions) is rejected here.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c == b'{' {
            match REFERENCE_PATTERN.find_at(source, pos) {
                Some(m) if m.start() == pos => {
                    tokens.push(Token::Reference(m.as_str().to_string()));
                    pos = m.end();
                    continue;
                }
                _ => return Err(unexpected(source, pos)),
            }
        }

        if c.is_ascii_digit() || (c == b'.' && next_is_digit(bytes, pos)) {
            let (number, end) = lex_number(source, pos)?;
            tokens.push(Token::Number(number));
            pos = end;
            continue;
        }

        if c == b'"' || c == b'\'' {
            let (text, end) = lex_string(source, pos)?;
            tokens.push(Token::Str(text));
            pos = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            let start = pos;
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
            {
                pos += 1;
            }
            tokens.push(Token::Ident(source[start..pos].to_string()));
            continue;
        }

        let rest = &source[pos..];
        let (token, width) = if rest.starts_with("===") {
            (Token::EqEqEq, 3)
        } else if rest.starts_with("!==") {
            (Token::NotEqEq, 3)
        } else if rest.starts_with("==") {
            (Token::EqEq, 2)
        } else if rest.starts_with("!=") {
            (Token::NotEq, 2)
        } else if rest.starts_with("<=") {
            (Token::Le, 2)
        } else if rest.starts_with(">=") {
            (Token::Ge, 2)
        } else if rest.starts_with("&&") {
            (Token::AndAnd, 2)
        } else if rest.starts_with("||") {
            (Token::OrOr, 2)
        } else {
            let single = match c {
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b'[' => Token::LBracket,
                b']' => Token::RBracket,
                b',' => Token::Comma,
                b'.' => Token::Dot,
                b'!' => Token::Bang,
                b'<' => Token::Lt,
                b'>' => Token::Gt,
                b'+' => Token::Plus,
                b'-' => Token::Minus,
                b'*' => Token::Star,
                b'/' => Token::Slash,
                b'%' => Token::Percent,
                _ => return Err(unexpected(source, pos)),
            };
            (single, 1)
        };
        tokens.push(token);
        pos += width;
    }

    Ok(tokens)
}

fn next_is_digit(bytes: &[u8], pos: usize) -> bool {
    bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
}

fn unexpected(source: &str, pos: usize) -> ExpressionError {
    let found = source[pos..].chars().next().unwrap_or(' ');
    ExpressionError::UnexpectedCharacter {
        found,
        position: pos,
    }
}

fn lex_number(source: &str, start: usize) -> Result<(f64, usize), ExpressionError> {
    let bytes = source.as_bytes();
    let mut pos = start;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' && next_is_digit(bytes, pos) {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    // `1abc` and similar are not numbers
    if pos < bytes.len() && (bytes[pos].is_ascii_alphabetic() || bytes[pos] == b'_') {
        return Err(unexpected(source, pos));
    }

    source[start..pos]
        .parse::<f64>()
        .map(|n| (n, pos))
        .map_err(|_| unexpected(source, start))
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), ExpressionError> {
    let mut chars = source[start..].char_indices();
    let (_, quote) = chars.next().ok_or(ExpressionError::UnterminatedString { position: start })?;
    let mut text = String::new();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or(ExpressionError::UnterminatedString { position: start })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            '\n' => return Err(ExpressionError::UnterminatedString { position: start }),
            c if c == quote => return Ok((text, start + offset + c.len_utf8())),
            c => text.push(c),
        }
    }

    Err(ExpressionError::UnterminatedString { position: start })
}
