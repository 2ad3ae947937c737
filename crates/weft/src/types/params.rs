use indexmap::IndexMap;

use super::Value;

/// An ordered name-to-value map visible within one evaluation scope.
///
/// Scopes nest by construction: a control sequence without `:inherit` builds
/// a fresh map holding only its declared bindings, while `:inherit` starts
/// from a copy of the enclosing map. Lookup itself never walks outward.
///
/// Insertion order is preserved and observable through [`Params::iter`].
///
/// # Example
///
/// ```
/// use weft::{Params, Value};
///
/// let mut params = Params::new();
/// params.insert("name", Value::from("Alice"));
/// assert_eq!(params.get("name"), Some(&Value::from("Alice")));
/// assert_eq!(params.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    map: IndexMap<String, Value>,
}

impl Params {
    /// Create an empty parameter map.
    pub fn new() -> Params {
        Params::default()
    }

    /// Bind `name` to `value`, replacing any existing binding.
    ///
    /// Returns the previous value when the name was already bound.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.map.insert(name.into(), value)
    }

    /// Look up a binding by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    /// Remove a binding by name, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.shift_remove(name)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map has no bindings.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Params {
            map: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}
