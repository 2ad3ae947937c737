//! Template evaluation: the IR walker, fragment execution, template
//! loading, and the processor façade.

mod context;
mod error;
mod evaluator;
mod fragment;
mod loader;
mod processor;

pub use error::{ConfigError, EvalError, FragmentError, LoadError};
pub use fragment::{ExprEngine, Fragment, FragmentCtx, FragmentEngine};
pub use loader::{FsLoader, Loader};
pub use processor::{ErrorHandler, ErrorPolicy, Processor, Sink};
