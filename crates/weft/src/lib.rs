//! weft: an HTML template processor.
//!
//! Templates combine literal text with variable-substitution scopes
//! (`<=name …>`), control sequences (`<:for>`, `<:eval>`, `<:include>`,
//! `<:cond>`, `<:set>`, embedded code `<:…/>`), and comments (`<# … />`).
//! Parsed templates and compiled code fragments are memoized in a shared,
//! bounded LRU cache keyed by content.

pub mod cache;
pub mod interpreter;
pub mod parser;
pub mod types;

pub use cache::{
    cache_highwatermark, cache_lowwatermark, cache_sizes, clear_cache, set_cache_highwatermark,
    set_cache_lowwatermark,
};
pub use interpreter::{
    ConfigError, ErrorHandler, ErrorPolicy, EvalError, ExprEngine, Fragment, FragmentCtx,
    FragmentEngine, FragmentError, FsLoader, LoadError, Loader, Processor, Sink,
};
pub use parser::{Node, ParseDiagnostic, Parsed, Template, parse_template};
pub use types::{Params, Scratch, TemplateId, Value, ValueKind};

/// Creates a [`Params`] map from key-value pairs.
///
/// Values are converted via `Into<Value>`, so you can pass strings,
/// integers, or vectors directly.
///
/// # Example
///
/// ```
/// use weft::{Value, params};
///
/// let p = params! { "count" => 3, "name" => "Alice" };
/// assert_eq!(p.len(), 2);
/// assert_eq!(p.get("name"), Some(&Value::from("Alice")));
/// ```
#[macro_export]
macro_rules! params {
    {} => {
        $crate::Params::new()
    };
    { $($key:expr => $value:expr),+ $(,)? } => {
        {
            let mut map = $crate::Params::new();
            $(
                map.insert($key, ::std::convert::Into::<$crate::Value>::into($value));
            )+
            map
        }
    };
}
