use const_fnv1a_hash::fnv1a_hash_str_64;
use serde::{Deserialize, Serialize};

/// A compact content fingerprint for template source text.
///
/// `TemplateId` wraps a 64-bit FNV-1a hash of the source bytes. Template
/// identity is by content: the same source always produces the same id, and
/// the id is the key under which the parsed form is cached.
///
/// # Example
///
/// ```
/// use weft::TemplateId;
///
/// let a = TemplateId::from_source("pre<=v/>post");
/// let b = TemplateId::from_source("pre<=v/>post");
/// assert_eq!(a, b);
/// ```
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TemplateId(u64);

impl TemplateId {
    /// Fingerprint a template source. This is a `const fn`.
    pub const fn from_source(source: &str) -> Self {
        Self(fnv1a_hash_str_64(source))
    }

    /// Get the raw hash value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TemplateId({:016x})", self.0)
    }
}
