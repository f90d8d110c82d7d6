//! Deterministic cache keys for (document, page) pairs.

use std::fmt;
use std::path::{Path, PathBuf};

/// Hex-encoded BLAKE3 digest identifying one page of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageHash(String);

impl PageHash {
    /// Wrap an already-computed hex digest, e.g. one read back from the
    /// cache database.
    pub fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for a page: BLAKE3 over the absolute document
/// path, a `:` separator, and the zero-based page index in decimal.
///
/// The key deliberately ignores the OCR model: the first transcription
/// of a page is permanent regardless of later model upgrades.
pub fn page_hash(source_path: &Path, page_index: usize) -> PageHash {
    let key = format!("{}:{}", normalize_path(source_path), page_index);
    PageHash(blake3::hash(key.as_bytes()).to_hex().to_string())
}

/// Resolve relative paths against the current directory so the same
/// file hashes identically however it was referenced.
fn normalize_path(path: &Path) -> String {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute.display().to_string()
}
