//! Tokenizer for the condition language.

use crate::error::{ConditionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Identifier(String),
    StringLiteral(String),
    Number(f64),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Bang,
    AndAnd,
    OrOr,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Identifier(name) => format!("identifier '{name}'"),
            Self::StringLiteral(_) => "string literal".to_string(),
            Self::Number(n) => format!("number {n}"),
            Self::LeftParen => "'('".to_string(),
            Self::RightParen => "')'".to_string(),
            Self::LeftBracket => "'['".to_string(),
            Self::RightBracket => "']'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::Bang => "'!'".to_string(),
            Self::AndAnd => "'&&'".to_string(),
            Self::OrOr => "'||'".to_string(),
            Self::EqualEqual => "'=='".to_string(),
            Self::NotEqual => "'!='".to_string(),
            Self::Less => "'<'".to_string(),
            Self::LessEqual => "'<='".to_string(),
            Self::Greater => "'>'".to_string(),
            Self::GreaterEqual => "'>='".to_string(),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub position: usize,
}

/// Splits condition text into tokens.
///
/// Strings may use single or double quotes and support `\\`, `\'`, `\"`,
/// `\n` and `\t` escapes.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        let kind = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' | ')' | '[' | ']' | ',' | '.' | '+' | '-' => {
                chars.next();
                match ch {
                    '(' => TokenKind::LeftParen,
                    ')' => TokenKind::RightParen,
                    '[' => TokenKind::LeftBracket,
                    ']' => TokenKind::RightBracket,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    '+' => TokenKind::Plus,
                    _ => TokenKind::Minus,
                }
            }
            '!' | '=' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.next_if(|&(_, c)| c == '=').is_some();
                match (ch, followed_by_eq) {
                    ('!', true) => TokenKind::NotEqual,
                    ('!', false) => TokenKind::Bang,
                    ('=', true) => TokenKind::EqualEqual,
                    ('=', false) => {
                        return Err(ConditionError::parsing(
                            position,
                            "assignment is not allowed, use '=='",
                        ));
                    }
                    ('<', true) => TokenKind::LessEqual,
                    ('<', false) => TokenKind::Less,
                    ('>', true) => TokenKind::GreaterEqual,
                    _ => TokenKind::Greater,
                }
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == ch).is_none() {
                    return Err(ConditionError::parsing(
                        position,
                        format!("unexpected '{ch}', use '{ch}{ch}'"),
                    ));
                }
                if ch == '&' {
                    TokenKind::AndAnd
                } else {
                    TokenKind::OrOr
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, c)) if c == ch => break,
                        Some((escape_at, '\\')) => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, c @ ('\\' | '\'' | '"'))) => value.push(c),
                            Some((_, other)) => {
                                return Err(ConditionError::parsing(
                                    escape_at,
                                    format!("unsupported escape '\\{other}'"),
                                ));
                            }
                            None => {
                                return Err(ConditionError::parsing(
                                    position,
                                    "unterminated string literal",
                                ));
                            }
                        },
                        Some((_, c)) => value.push(c),
                        None => {
                            return Err(ConditionError::parsing(
                                position,
                                "unterminated string literal",
                            ));
                        }
                    }
                }
                TokenKind::StringLiteral(value)
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
                    text.push(c);
                }
                // A fraction needs a digit after the dot; otherwise the dot
                // starts a method call.
                let mut lookahead = chars.clone();
                if lookahead.next().is_some_and(|(_, c)| c == '.')
                    && lookahead.next().is_some_and(|(_, c)| c.is_ascii_digit())
                {
                    chars.next();
                    text.push('.');
                    while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
                        text.push(c);
                    }
                }
                let number = text.parse::<f64>().map_err(|e| {
                    ConditionError::parsing(position, format!("invalid number '{text}': {e}"))
                })?;
                TokenKind::Number(number)
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some((_, c)) =
                    chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '_' || c == '$')
                {
                    ident.push(c);
                }
                TokenKind::Identifier(ident)
            }
            other => {
                return Err(ConditionError::parsing(
                    position,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}
