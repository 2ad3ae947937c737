use serde::{Deserialize, Serialize};

/// A runtime value flowing through template evaluation.
///
/// The `Value` enum provides a dynamic type system for template bindings and
/// fragment results: a binding may be absent, a single string, or a list of
/// further values. Lists nest; the renderer flattens them lazily.
///
/// # Example
///
/// ```
/// use weft::Value;
///
/// // Strings become Value::Scalar
/// let name: Value = "Alice".into();
///
/// // Integers render as their decimal form
/// let count: Value = 42.into();
/// assert_eq!(count.render(), "42");
///
/// // Vectors become Value::List
/// let xs: Value = vec!["a", "b"].into();
/// assert_eq!(xs.render(), "ab");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value. A binding that was never supplied.
    #[default]
    Empty,

    /// A single string value.
    Scalar(String),

    /// An ordered list of values. Elements may themselves be lists.
    List(Vec<Value>),
}

/// How a value classifies for the `type` modifier of a variable scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A non-empty scalar.
    Scalar,
    /// A non-empty list.
    Array,
    /// Absent, an empty string, or an empty list.
    Empty,
}

impl ValueKind {
    /// The keyword used for this kind in a `type=` attribute.
    pub fn keyword(self) -> &'static str {
        match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Array => "array",
            ValueKind::Empty => "empty",
        }
    }
}

impl Value {
    /// Build a scalar value.
    pub fn scalar(s: impl Into<String>) -> Value {
        Value::Scalar(s.into())
    }

    /// Classify this value as scalar-like, array-like, or empty.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(s) if !s.is_empty() => ValueKind::Scalar,
            Value::List(xs) if !xs.is_empty() => ValueKind::Array,
            _ => ValueKind::Empty,
        }
    }

    /// Get this value as a scalar string, if it is one.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a list slice, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(xs) => Some(xs),
            _ => None,
        }
    }

    /// Truthiness for grep conditions, case conditions, and boolean operators.
    ///
    /// Empty is false; a scalar is false when its string is empty or `"0"`;
    /// a list is false when it has no elements.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Scalar(s) => !s.is_empty() && s != "0",
            Value::List(xs) => !xs.is_empty(),
        }
    }

    /// Render this value into output text.
    ///
    /// Empty contributes nothing, a scalar contributes its string, and a
    /// list contributes each element rendered in sequence, recursively.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Value::Empty => {}
            Value::Scalar(s) => out.push_str(s),
            Value::List(xs) => {
                for x in xs {
                    x.render_into(out);
                }
            }
        }
    }

    /// Consume this value, normalizing it to a list for element expansion.
    ///
    /// A list stays as-is, a non-empty scalar becomes a one-element list,
    /// and anything classified empty becomes the empty list.
    pub fn into_elements(self) -> Vec<Value> {
        match self {
            Value::List(xs) => xs,
            Value::Scalar(s) if !s.is_empty() => vec![Value::Scalar(s)],
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

// From implementations for common types

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(n.to_string())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Scalar(n.to_string())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Scalar(n.to_string())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Scalar(n.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(xs: Vec<Value>) -> Self {
        Value::List(xs)
    }
}

impl From<Vec<&str>> for Value {
    fn from(xs: Vec<&str>) -> Self {
        Value::List(xs.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(xs: Vec<String>) -> Self {
        Value::List(xs.into_iter().map(Value::from).collect())
    }
}

impl From<Option<Value>> for Value {
    fn from(v: Option<Value>) -> Self {
        v.unwrap_or(Value::Empty)
    }
}
