//! Rule expression language
//!
//! Template documents cannot carry closures, so computed fields (offsets,
//! value checks, column derivations) are written as small expressions:
//!
//! ```text
//! current.width - 1
//! value in ["Height", "H"]
//! if value == "Announced Date" then "Release Date" else value
//! ```

pub mod ast;
pub mod eval;
mod grammar;
pub mod lexer;

pub use ast::*;
pub use eval::{evaluate, EvalError, Scope, Value};
pub use grammar::parse;

use crate::error::ParseError;

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Spanned<Expr>,
}

impl Expression {
    /// Parse an expression
    pub fn parse(source: &str) -> Result<Self, Vec<ParseError>> {
        let ast = parse(source)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Spanned<Expr> {
        &self.ast
    }

    /// Evaluate against a scope
    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Value, EvalError> {
        evaluate(&self.ast, scope)
    }
}
