//! Formula parser - turns a token stream into an expression tree.
//! Binary operators are parsed by precedence climbing over the language's
//! levels; every level is left-associative. There are no unary operators:
//! a sign is only accepted as part of a number literal.

use thiserror::Error;

use super::language::{BinaryOp, Language};
use super::lexer::{tokenize, LexError, Token, TokenKind};
use crate::reference::{UnboundRange, UnboundReference};

/// Parsed formula. Sheet names in references are still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Formula with no tokens at all.
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Cell(UnboundReference),
    Range(UnboundRange),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unexpected token at position {0}")]
    UnexpectedToken(usize),

    #[error("missing closing parenthesis")]
    MissingParen,
}

/// Parse formula text (without the leading `=`).
///
/// Empty or whitespace-only text parses to `Expr::Empty`.
pub fn parse(formula: &str, language: &Language) -> Result<Expr, ParseError> {
    let tokens = tokenize(formula, language)?;
    if tokens.is_empty() {
        return Ok(Expr::Empty);
    }
    let top = language.level_count();
    let (expr, pos) = parse_level(&tokens, 0, top, language)?;
    if pos < tokens.len() {
        return Err(ParseError::UnexpectedToken(pos));
    }
    Ok(expr)
}

/// Parse operators at `level` and tighter. Level 0 is the operand itself.
fn parse_level(
    tokens: &[Token],
    pos: usize,
    level: usize,
    language: &Language,
) -> Result<(Expr, usize), ParseError> {
    if level == 0 {
        return parse_operand(tokens, pos, language);
    }

    let (mut left, mut pos) = parse_level(tokens, pos, level - 1, language)?;
    while let Some(Token { kind: TokenKind::Operator(op), .. }) = tokens.get(pos) {
        // Operator levels are 0-based, operand parsing sits below them.
        if language.level_of(*op) + 1 != level {
            break;
        }
        let (right, new_pos) = parse_level(tokens, pos + 1, level - 1, language)?;
        left = Expr::Binary {
            op: *op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_operand(tokens: &[Token], pos: usize, language: &Language) -> Result<(Expr, usize), ParseError> {
    let Some(token) = tokens.get(pos) else {
        return Err(ParseError::UnexpectedEnd);
    };

    match &token.kind {
        TokenKind::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        TokenKind::Text(s) => Ok((Expr::Text(s.clone()), pos + 1)),
        TokenKind::Bool(b) => Ok((Expr::Bool(*b), pos + 1)),
        TokenKind::Cell(r) => Ok((Expr::Cell(r.clone()), pos + 1)),
        TokenKind::Range(r) => Ok((Expr::Range(r.clone()), pos + 1)),
        TokenKind::Function(name) => {
            // The lexer only emits a function name when `(` follows.
            let (args, new_pos) = parse_function_args(tokens, pos + 2, language)?;
            Ok((Expr::Call { name: name.clone(), args }, new_pos))
        }
        TokenKind::LParen => {
            let (expr, pos) = parse_level(tokens, pos + 1, language.level_count(), language)?;
            match tokens.get(pos).map(|t| &t.kind) {
                Some(TokenKind::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err(ParseError::UnexpectedToken(pos)),
                None => Err(ParseError::MissingParen),
            }
        }
        _ => Err(ParseError::UnexpectedToken(pos)),
    }
}

fn parse_function_args(
    tokens: &[Token],
    pos: usize,
    language: &Language,
) -> Result<(Vec<Expr>, usize), ParseError> {
    let mut args = Vec::new();
    let mut pos = pos;

    // SUM()
    if let Some(TokenKind::RParen) = tokens.get(pos).map(|t| &t.kind) {
        return Ok((args, pos + 1));
    }

    loop {
        let (arg, new_pos) = parse_level(tokens, pos, language.level_count(), language)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos).map(|t| &t.kind) {
            Some(TokenKind::RParen) => return Ok((args, pos + 1)),
            Some(TokenKind::Comma) => pos += 1,
            Some(_) => return Err(ParseError::UnexpectedToken(pos)),
            None => return Err(ParseError::MissingParen),
        }
    }
}
