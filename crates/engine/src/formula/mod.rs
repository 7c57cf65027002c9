//! Formula language: tokenizing, validation, parsing, evaluation and
//! reference rewriting.

pub mod language;
pub mod lexer;
pub mod validate;
pub mod parser;
pub mod eval;
pub mod functions;
pub mod ols;
pub mod refs;
pub mod translate;
