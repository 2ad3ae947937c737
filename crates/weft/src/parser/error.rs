//! Parse diagnostics for template sources.

use thiserror::Error;

/// A structural problem found while parsing a template.
///
/// The parser recovers from every diagnostic: the offending span is emitted
/// as literal text and parsing resumes at the next opener, so a diagnostic
/// never aborts a parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{column}: {message}")]
pub struct ParseDiagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}
