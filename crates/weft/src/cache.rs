//! Process-wide shared cache for parsed templates and compiled fragments.
//!
//! Two logically independent LRU tables share one high-/low-watermark pair:
//! when an insertion brings a table's size up to the high watermark, that
//! table is trimmed back to the low watermark by least-recent use. The cache
//! is shared across every processor instance in the process.
//!
//! Thread safety: both tables live behind one `Mutex`, whose critical
//! sections cover lookup, insert, and trim atomically, so a table's size
//! never exceeds the high watermark on return from any public operation and
//! no entry is returned after eviction. Builders (parse, compile) run
//! outside the lock; two concurrent misses on one key may both build, and
//! the later insert wins — builders are pure, so the results are
//! interchangeable.

use std::hash::Hash;
use std::sync::{Arc, LazyLock, Mutex};

use indexmap::IndexMap;

use crate::interpreter::{Fragment, FragmentEngine, FragmentError};
use crate::parser::{Parsed, parse_template};
use crate::types::TemplateId;

const DEFAULT_HIGH_WATERMARK: usize = 10_000;
const DEFAULT_LOW_WATERMARK: usize = 5_000;

/// Compiled fragments are keyed by source hash and host namespace.
type FragmentKey = (u64, String);

/// An insertion-ordered map used as an LRU: a hit moves the entry to the
/// back, trimming pops from the front.
struct LruTable<K, V> {
    entries: IndexMap<K, V>,
}

impl<K: Hash + Eq, V: Clone> LruTable<K, V> {
    fn new() -> LruTable<K, V> {
        LruTable {
            entries: IndexMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let (key, value) = self.entries.shift_remove_entry(key)?;
        let out = value.clone();
        self.entries.insert(key, value);
        Some(out)
    }

    fn insert(&mut self, key: K, value: V) {
        self.entries.shift_remove(&key);
        self.entries.insert(key, value);
    }

    fn trim_to(&mut self, target: usize) {
        while self.entries.len() > target {
            self.entries.shift_remove_index(0);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

struct SharedCache {
    templates: LruTable<TemplateId, Arc<Parsed>>,
    fragments: LruTable<FragmentKey, Arc<dyn Fragment>>,
    high: usize,
    low: usize,
}

impl SharedCache {
    fn new() -> SharedCache {
        SharedCache {
            templates: LruTable::new(),
            fragments: LruTable::new(),
            high: DEFAULT_HIGH_WATERMARK,
            low: DEFAULT_LOW_WATERMARK,
        }
    }

    /// Trim a table that has reached the high watermark down to the low
    /// watermark (clamped so trimming always satisfies the high bound).
    fn trim_templates(&mut self) {
        if self.templates.len() >= self.high {
            let target = self.low.min(self.high);
            self.templates.trim_to(target);
            log::debug!("template cache trimmed to {target}");
        }
    }

    fn trim_fragments(&mut self) {
        if self.fragments.len() >= self.high {
            let target = self.low.min(self.high);
            self.fragments.trim_to(target);
            log::debug!("fragment cache trimmed to {target}");
        }
    }
}

static SHARED: LazyLock<Mutex<SharedCache>> = LazyLock::new(|| Mutex::new(SharedCache::new()));

fn with_cache<T>(f: impl FnOnce(&mut SharedCache) -> T) -> T {
    let mut guard = SHARED.lock().expect("shared template cache lock poisoned");
    f(&mut guard)
}

/// Parse a template through the cache. With `bypass`, parsing is performed
/// fresh and the result is not retained.
///
/// The cached entry carries the parse diagnostics alongside the IR, so a
/// hit reports exactly what a fresh parse would.
pub(crate) fn parsed(source: &str, bypass: bool) -> Arc<Parsed> {
    if bypass {
        return Arc::new(parse_template(source));
    }
    let id = TemplateId::from_source(source);
    if let Some(hit) = with_cache(|c| c.templates.get(&id)) {
        return hit;
    }
    let built = Arc::new(parse_template(source));
    with_cache(|c| {
        c.templates.insert(id, built.clone());
        c.trim_templates();
    });
    built
}

/// Compile a fragment through the cache. Compile failures are never cached;
/// each invocation site re-attempts and reports through the error policy.
pub(crate) fn fragment(
    source: &str,
    namespace: &str,
    engine: &dyn FragmentEngine,
    bypass: bool,
) -> Result<Arc<dyn Fragment>, FragmentError> {
    if bypass {
        return engine.compile(source, namespace);
    }
    let key = (TemplateId::from_source(source).as_u64(), namespace.to_string());
    if let Some(hit) = with_cache(|c| c.fragments.get(&key)) {
        return Ok(hit);
    }
    let built = engine.compile(source, namespace)?;
    with_cache(|c| {
        c.fragments.insert(key, built.clone());
        c.trim_fragments();
    });
    Ok(built)
}

/// Get the shared high watermark (default 10000).
pub fn cache_highwatermark() -> usize {
    with_cache(|c| c.high)
}

/// Set the shared high watermark. Setting it at or below a table's current
/// size trims that table synchronously.
pub fn set_cache_highwatermark(value: usize) {
    with_cache(|c| {
        c.high = value;
        c.trim_templates();
        c.trim_fragments();
    });
}

/// Get the shared low watermark (default 5000).
pub fn cache_lowwatermark() -> usize {
    with_cache(|c| c.low)
}

/// Set the shared low watermark, the size tables are trimmed back to.
pub fn set_cache_lowwatermark(value: usize) {
    with_cache(|c| c.low = value);
}

/// Empty both tables.
pub fn clear_cache() {
    with_cache(|c| {
        c.templates.clear();
        c.fragments.clear();
    });
}

/// Current sizes as `(parsed_templates, compiled_fragments)`.
pub fn cache_sizes() -> (usize, usize) {
    with_cache(|c| (c.templates.len(), c.fragments.len()))
}
