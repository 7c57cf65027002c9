//! Formula tokenizer.
//!
//! Splits formula text (without the leading `=`) into tokens carrying their
//! byte span, so reference rewriting can splice replacement text back into
//! the original string without disturbing anything else.
//!
//! # Words
//!
//! Anything that is not whitespace, punctuation, a string literal or an
//! operator is read as a *word*: it runs until a break character. A word
//! immediately followed by `(` is a function name; otherwise it must be a
//! number, `TRUE`/`FALSE`, a cell reference or a range.
//!
//! # Signs
//!
//! A `-` standing where an operand is expected and directly followed by a
//! digit starts a signed number. Every other `-` is the binary operator, so
//! `-A1`, `--1` and a leading `*` are rejected by the parser.

use std::ops::Range;

use thiserror::Error;

use super::language::{BinaryOp, Language};
use crate::error::RefError;
use crate::reference::{UnboundRange, UnboundReference};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Bool(bool),
    Cell(UnboundReference),
    Range(UnboundRange),
    /// Upper-cased function name. Always followed by `LParen`.
    Function(String),
    Operator(BinaryOp),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the formula text.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal starting at {0}")]
    UnterminatedString(usize),

    #[error("unterminated sheet name starting at {0}")]
    UnterminatedSheetName(usize),

    #[error("unknown operator at {0}")]
    UnknownOperator(usize),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error(transparent)]
    Reference(#[from] RefError),
}

/// Tokenize formula text.
pub fn tokenize(input: &str, language: &Language) -> Result<Vec<Token>, LexError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pos = 0;

    while let Some(c) = input[pos..].chars().next() {
        let start = pos;
        let kind = match c {
            c if c.is_whitespace() => {
                pos += c.len_utf8();
                continue;
            }
            '(' => {
                pos += 1;
                TokenKind::LParen
            }
            ')' => {
                pos += 1;
                TokenKind::RParen
            }
            ',' => {
                pos += 1;
                TokenKind::Comma
            }
            '"' => {
                let (text, end) = read_string(input, start)?;
                pos = end;
                TokenKind::Text(text)
            }
            '\'' => {
                let end = read_quoted_reference(input, start, language)?;
                pos = end;
                reference_kind(&input[start..end])?
            }
            '-' if expects_operand(&tokens) && next_is_digit(input, start + 1) => {
                let end = read_word(input, start + 1, language);
                pos = end;
                match parse_number(&input[start + 1..end]) {
                    Some(n) => TokenKind::Number(-n),
                    None => return Err(LexError::InvalidToken(input[start..end].to_string())),
                }
            }
            c if language.is_operator_char(c) => match language.match_operator(&input[start..]) {
                Some((op, len)) => {
                    pos += len;
                    TokenKind::Operator(op)
                }
                None => return Err(LexError::UnknownOperator(start)),
            },
            _ => {
                let end = read_word(input, start, language);
                if end == start {
                    return Err(LexError::InvalidToken(c.to_string()));
                }
                pos = end;
                let word = &input[start..end];
                if input[end..].starts_with('(') {
                    function_kind(word)?
                } else {
                    word_kind(word)?
                }
            }
        };
        tokens.push(Token { kind, span: start..pos });
    }

    Ok(tokens)
}

/// True when the next token has to be an operand: at the start, after an
/// operator, after `(` or after `,`.
fn expects_operand(tokens: &[Token]) -> bool {
    matches!(
        tokens.last().map(|t| &t.kind),
        None | Some(TokenKind::Operator(_)) | Some(TokenKind::LParen) | Some(TokenKind::Comma)
    )
}

fn next_is_digit(input: &str, pos: usize) -> bool {
    input[pos..].chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// End of the word starting at `start`.
fn read_word(input: &str, start: usize, language: &Language) -> usize {
    let mut chars = input[start..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let ends_word = c.is_whitespace()
            || language.is_break_char(c)
            || matches!(c, '(' | '"' | '\'')
            || (c == '!' && matches!(chars.peek(), Some((_, '='))));
        if ends_word {
            return start + i;
        }
    }
    input.len()
}

/// Read a `"..."` literal. Returns the unescaped text and the end offset.
fn read_string(input: &str, start: usize) -> Result<(String, usize), LexError> {
    let mut text = String::new();
    let mut chars = input[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => text.push(escaped),
                None => break,
            },
            '"' => return Ok((text, start + 1 + i + 1)),
            c => text.push(c),
        }
    }
    Err(LexError::UnterminatedString(start))
}

/// Read `'Sheet Name'!A1` or `'Sheet Name'!A1:B2`, returning the end offset.
fn read_quoted_reference(input: &str, start: usize, language: &Language) -> Result<usize, LexError> {
    let mut chars = input[start + 1..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\'' {
            continue;
        }
        if matches!(chars.peek(), Some((_, '\''))) {
            chars.next();
            continue;
        }
        let after_quote = start + 1 + i + 1;
        if !input[after_quote..].starts_with('!') {
            return Err(LexError::InvalidToken(input[start..after_quote].to_string()));
        }
        let end = read_word(input, after_quote + 1, language);
        return Ok(end);
    }
    Err(LexError::UnterminatedSheetName(start))
}

fn function_kind(word: &str) -> Result<TokenKind, LexError> {
    let mut chars = word.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    if valid {
        Ok(TokenKind::Function(word.to_ascii_uppercase()))
    } else {
        Err(LexError::InvalidToken(word.to_string()))
    }
}

fn word_kind(word: &str) -> Result<TokenKind, LexError> {
    let first = word.chars().next().unwrap_or(' ');
    if first.is_ascii_digit() || first == '.' {
        return parse_number(word)
            .map(TokenKind::Number)
            .ok_or_else(|| LexError::InvalidToken(word.to_string()));
    }
    if word.eq_ignore_ascii_case("TRUE") {
        return Ok(TokenKind::Bool(true));
    }
    if word.eq_ignore_ascii_case("FALSE") {
        return Ok(TokenKind::Bool(false));
    }
    reference_kind(word)
}

fn reference_kind(word: &str) -> Result<TokenKind, LexError> {
    if word.contains(':') {
        Ok(TokenKind::Range(UnboundRange::parse(word)?))
    } else {
        Ok(TokenKind::Cell(UnboundReference::parse(word)?))
    }
}

/// Unsigned decimal: digits with at most one `.` and at least one digit.
fn parse_number(word: &str) -> Option<f64> {
    let dots = word.bytes().filter(|&b| b == b'.').count();
    let digits = word.bytes().filter(u8::is_ascii_digit).count();
    if dots > 1 || digits == 0 || digits + dots != word.len() {
        return None;
    }
    word.parse().ok()
}
