//! Error types for template evaluation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A failure inside an embedded code fragment.
///
/// Both kinds are dispatched through the processor's error policy at the
/// invocation site; a compile failure surfaces on first use, matching the
/// deferred compilation of fragments.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// The fragment source could not be compiled.
    #[error("cannot compile fragment: {message}")]
    Compile { message: String },

    /// The fragment raised during invocation (e.g. `die "boom"`).
    /// The display form is the raised message alone, so that the `output`
    /// policy injects exactly `{eprefix}{message}`.
    #[error("{message}")]
    Raised { message: String },
}

/// A failure resolving or reading template bytes.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The template file exists but could not be read.
    #[error("cannot read template '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No search-path entry yielded the named template.
    #[error("template '{name}' not found in search path")]
    NotFound { name: String },
}

/// An error that aborts an `evaluate` call.
///
/// Most runtime problems are dispatched through the error policy and do not
/// abort; these are the ones that do.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The `die` policy (or a failing error handler) aborted evaluation.
    /// Partial output is discarded; the message is already on the error list.
    #[error("{message}")]
    Aborted { message: String },

    /// An include re-entered a template already on the include stack.
    #[error("include cycle: {}", chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },

    /// Nested evaluation (includes and `<:eval>`) exceeded the depth bound.
    #[error("maximum evaluation depth exceeded")]
    DepthExceeded,

    /// Writing to the sink failed after evaluation succeeded.
    #[error("sink write failed: {source}")]
    Sink {
        #[source]
        source: io::Error,
    },
}

/// A construction-time configuration problem.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `onerror` was neither `warn`, `die`, `output`, nor a callable.
    #[error("unknown error policy '{0}'")]
    UnknownPolicy(String),
}
