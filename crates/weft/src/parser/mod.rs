//! Template and fragment parsers.
//!
//! This module turns template bytes into the IR tree the evaluator walks,
//! and fragment source strings into expressions for the default fragment
//! engine. The template parser is total: structural errors become
//! diagnostics plus literal text, never a failed parse.

pub mod ast;
pub mod error;
mod expr;
mod template;

pub use ast::*;
pub use error::ParseDiagnostic;
pub use expr::{BinaryOp, Expr, UnaryOp, parse_expr};
pub use template::{Parsed, parse_template};
