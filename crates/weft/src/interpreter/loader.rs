//! Template resolution through a search path.

use std::fs;
use std::path::{Path, PathBuf};

use crate::interpreter::error::LoadError;

/// Resolves a template name to source text.
///
/// The evaluator consults the loader for `<:include>`; the processor's
/// search path is passed through on every call. Implementations decide what
/// names mean — the default reads files from disk.
pub trait Loader: Send + Sync {
    fn resolve(&self, name: &str, search_path: &[PathBuf]) -> Result<String, LoadError>;
}

/// The filesystem loader.
///
/// Relative names are tried against each search-path directory in order,
/// then against the name as given. Absolute names load directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl FsLoader {
    /// Environment variable naming the default search path, split on the
    /// platform path separator.
    pub const PATH_VAR: &'static str = "WEFT_TEMPLATE_PATH";

    /// Read the search path from [`FsLoader::PATH_VAR`], if set.
    pub fn search_path_from_env() -> Vec<PathBuf> {
        std::env::var_os(Self::PATH_VAR)
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_default()
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl Loader for FsLoader {
    fn resolve(&self, name: &str, search_path: &[PathBuf]) -> Result<String, LoadError> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            return read(direct);
        }
        for dir in search_path {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return read(&candidate);
            }
        }
        if direct.is_file() {
            return read(direct);
        }
        Err(LoadError::NotFound {
            name: name.to_string(),
        })
    }
}
