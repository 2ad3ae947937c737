//! The processor façade: configuration plus the `evaluate` entry points.
//!
//! A processor is immutable after construction apart from its error list.
//! Parsed templates and compiled fragments are shared through the
//! process-wide cache unless the processor is built with `no_cache`.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bon::Builder;

use crate::cache;
use crate::interpreter::context::{EvalContext, Frame};
use crate::interpreter::error::{ConfigError, EvalError, LoadError};
use crate::interpreter::evaluator::Evaluator;
use crate::interpreter::fragment::{ExprEngine, FragmentEngine};
use crate::interpreter::loader::{FsLoader, Loader};
use crate::types::{Params, Scratch};

/// What to do when a fragment fails at runtime.
///
/// Every dispatch first appends `{eprefix}{message}` to the error list.
#[derive(Clone)]
pub enum ErrorPolicy {
    /// Emit a platform warning and substitute empty output.
    Warn,
    /// Abort the current `evaluate`; partial output is discarded.
    Die,
    /// Inject the message text at the failure site.
    Output,
    /// Invoke a callable; its return replaces the failing node. A failing
    /// callable falls through to `Die` semantics.
    Handler(ErrorHandler),
}

/// The callable form of an error policy.
pub type ErrorHandler = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

impl ErrorPolicy {
    /// Map a configuration string to a policy. Anything other than `warn`,
    /// `die`, or `output` is a configuration error.
    pub fn from_name(name: &str) -> Result<ErrorPolicy, ConfigError> {
        match name {
            "warn" => Ok(ErrorPolicy::Warn),
            "die" => Ok(ErrorPolicy::Die),
            "output" => Ok(ErrorPolicy::Output),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Warn => f.write_str("Warn"),
            ErrorPolicy::Die => f.write_str("Die"),
            ErrorPolicy::Output => f.write_str("Output"),
            ErrorPolicy::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl PartialEq for ErrorPolicy {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (ErrorPolicy::Warn, ErrorPolicy::Warn)
                | (ErrorPolicy::Die, ErrorPolicy::Die)
                | (ErrorPolicy::Output, ErrorPolicy::Output)
        )
    }
}

/// Where `evaluate_to_sink` delivers the rendered output.
///
/// The template is evaluated fully before anything is written, so an
/// evaluation failure leaves the target untouched.
pub enum Sink<'a> {
    /// Any writable stream (also covers print-capable objects).
    Writer(&'a mut dyn io::Write),
    /// A callable consumer of the rendered string.
    Func(&'a mut dyn FnMut(&str)),
    /// A file to create.
    Path(PathBuf),
}

fn default_engine() -> Arc<dyn FragmentEngine> {
    Arc::new(ExprEngine)
}

fn default_loader() -> Arc<dyn Loader> {
    Arc::new(FsLoader)
}

/// An HTML template processor.
///
/// # Example
///
/// ```
/// use weft::{Processor, params};
///
/// let processor = Processor::builder().template("pre<=v/>post").build();
/// let out = processor.evaluate(params! { "v" => "X" }).unwrap();
/// assert_eq!(out, "preXpost");
/// ```
#[derive(Builder)]
#[builder(on(String, into))]
pub struct Processor {
    /// Template source text.
    template: String,

    /// Directories consulted by the loader for `<:include>`.
    #[builder(default)]
    search_path: Vec<PathBuf>,

    /// Host namespace identifier, part of the compiled-fragment cache key.
    #[builder(default = "main".to_string())]
    namespace: String,

    /// Error policy for fragment failures.
    #[builder(default = ErrorPolicy::Warn)]
    on_error: ErrorPolicy,

    /// Prefix applied to every recorded error message.
    #[builder(default)]
    eprefix: String,

    /// Bypass the shared cache: parse and compile fresh per evaluation.
    #[builder(default)]
    no_cache: bool,

    /// Fragment engine for embedded code.
    #[builder(default = default_engine())]
    engine: Arc<dyn FragmentEngine>,

    /// Template loader for `<:include>`.
    #[builder(default = default_loader())]
    loader: Arc<dyn Loader>,

    /// Accumulated error messages. Append-only within an evaluation, never
    /// cleared implicitly between evaluations.
    #[builder(skip)]
    errors: RefCell<Vec<String>>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("template", &self.template)
            .field("search_path", &self.search_path)
            .field("namespace", &self.namespace)
            .field("on_error", &self.on_error)
            .field("eprefix", &self.eprefix)
            .field("no_cache", &self.no_cache)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Construct a processor from a template file.
    ///
    /// Fails when the file is not readable; the cause is surfaced in the
    /// returned error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Processor, LoadError> {
        Self::from_file_with(path, Vec::new())
    }

    /// Construct a processor from a template file with a search path for
    /// its includes.
    pub fn from_file_with(
        path: impl AsRef<Path>,
        search_path: Vec<PathBuf>,
    ) -> Result<Processor, LoadError> {
        let path = path.as_ref();
        let template = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Processor::builder()
            .template(template)
            .search_path(search_path)
            .build())
    }

    /// The template source text.
    pub fn source(&self) -> &str {
        &self.template
    }

    /// Evaluate with the given bindings, using a fresh private scratchpad.
    pub fn evaluate(&self, params: Params) -> Result<String, EvalError> {
        let mut scratch = Scratch::new();
        self.evaluate_with(&mut scratch, params)
    }

    /// Evaluate with the given bindings and a caller-supplied scratchpad,
    /// which every fragment sees as its private data.
    pub fn evaluate_with(
        &self,
        scratch: &mut Scratch,
        params: Params,
    ) -> Result<String, EvalError> {
        let parsed = cache::parsed(&self.template, self.no_cache);
        let evaluator = Evaluator {
            engine: self.engine.as_ref(),
            loader: self.loader.as_ref(),
            namespace: &self.namespace,
            search_path: &self.search_path,
            on_error: &self.on_error,
            eprefix: &self.eprefix,
            no_cache: self.no_cache,
            errors: &self.errors,
        };
        evaluator.replay_diagnostics(&parsed);
        let mut frame = Frame::new(params);
        let mut ctx = EvalContext::new(scratch);
        evaluator.eval_nodes(&parsed.template.nodes, &mut frame, &mut ctx)
    }

    /// Evaluate and deliver the output to a sink, using a fresh private
    /// scratchpad.
    ///
    /// The target is only written after evaluation succeeded.
    pub fn evaluate_to_sink(&self, sink: Sink<'_>, params: Params) -> Result<(), EvalError> {
        let mut scratch = Scratch::new();
        self.evaluate_to_sink_with(sink, &mut scratch, params)
    }

    /// Evaluate with a caller-supplied scratchpad and deliver the output to
    /// a sink, mirroring [`Processor::evaluate_with`].
    pub fn evaluate_to_sink_with(
        &self,
        sink: Sink<'_>,
        scratch: &mut Scratch,
        params: Params,
    ) -> Result<(), EvalError> {
        let rendered = self.evaluate_with(scratch, params)?;
        match sink {
            Sink::Writer(writer) => writer
                .write_all(rendered.as_bytes())
                .map_err(|source| EvalError::Sink { source }),
            Sink::Func(consumer) => {
                consumer(&rendered);
                Ok(())
            }
            Sink::Path(path) => {
                fs::write(&path, rendered.as_bytes()).map_err(|source| EvalError::Sink { source })
            }
        }
    }

    /// A snapshot of the accumulated error messages.
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    /// Drain and return every accumulated error message.
    pub fn clear_errors(&self) -> Vec<String> {
        self.errors.take()
    }
}
