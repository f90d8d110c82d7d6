//! Persistent cache of OCR transcriptions keyed by page hash.
//!
//! Entries are insert-only: the first transcription stored for a hash
//! is the permanent answer, and later stores for the same hash are
//! no-ops. The only deletion path is the administrative [`OcrCache::clear`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tokio::task;

use crate::hash::PageHash;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {0}")]
    Storage(String),

    #[error("cache task failed to complete: {0}")]
    TaskJoin(#[from] task::JoinError),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

/// One persisted transcription. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrCacheEntry {
    pub page_hash: PageHash,
    pub source_path: PathBuf,
    /// Zero-based page index within the source document.
    pub page_number: usize,
    pub extracted_text: String,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait OcrCache: Send + Sync {
    async fn lookup(&self, hash: &PageHash) -> Result<Option<OcrCacheEntry>, CacheError>;

    /// Insert-only and idempotent: returns `true` when the entry was
    /// written, `false` when an entry for the hash already existed and
    /// was kept unchanged.
    async fn store(&self, entry: &OcrCacheEntry) -> Result<bool, CacheError>;

    /// Administrative wipe; returns the number of entries removed.
    async fn clear(&self) -> Result<usize, CacheError>;

    async fn count(&self) -> Result<usize, CacheError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ocr_cache (
    page_hash       TEXT PRIMARY KEY,
    source_path     TEXT NOT NULL,
    page_number     INTEGER NOT NULL,
    extracted_text  TEXT NOT NULL,
    model_used      TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
";

/// Durable [`OcrCache`] backed by SQLite.
///
/// The connection is serialized behind a mutex and every call is moved
/// off the async runtime with `spawn_blocking`. Idempotency comes from
/// `INSERT OR IGNORE` against the `page_hash` primary key, so two
/// processes sharing the database file still agree on first-write-wins.
pub struct SqliteOcrCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOcrCache {
    /// Open (creating if needed) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| CacheError::Storage(format!("creating {}: {err}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Ephemeral in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| CacheError::Storage("cache connection mutex poisoned".into()))?;
            op(&conn)
        })
        .await?
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OcrCacheEntry> {
    let created_raw: String = row.get(5)?;
    let created_at = created_raw.parse::<DateTime<Utc>>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(err))
    })?;
    let page_number: i64 = row.get(2)?;
    Ok(OcrCacheEntry {
        page_hash: PageHash::from_hex(row.get(0)?),
        source_path: PathBuf::from(row.get::<_, String>(1)?),
        page_number: page_number as usize,
        extracted_text: row.get(3)?,
        model_used: row.get(4)?,
        created_at,
    })
}

#[async_trait]
impl OcrCache for SqliteOcrCache {
    async fn lookup(&self, hash: &PageHash) -> Result<Option<OcrCacheEntry>, CacheError> {
        let hash = hash.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT page_hash, source_path, page_number, extracted_text, model_used, created_at
                 FROM ocr_cache WHERE page_hash = ?1",
                params![hash.as_str()],
                row_to_entry,
            )
            .optional()
            .map_err(CacheError::from)
        })
        .await
    }

    async fn store(&self, entry: &OcrCacheEntry) -> Result<bool, CacheError> {
        let entry = entry.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO ocr_cache
                 (page_hash, source_path, page_number, extracted_text, model_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.page_hash.as_str(),
                    entry.source_path.to_string_lossy().into_owned(),
                    entry.page_number as i64,
                    entry.extracted_text,
                    entry.model_used,
                    entry.created_at.to_rfc3339(),
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM ocr_cache", [])?))
            .await
    }

    async fn count(&self) -> Result<usize, CacheError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM ocr_cache", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

/// In-memory [`OcrCache`] for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryOcrCache {
    entries: tokio::sync::Mutex<HashMap<PageHash, OcrCacheEntry>>,
}

impl MemoryOcrCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OcrCache for MemoryOcrCache {
    async fn lookup(&self, hash: &PageHash) -> Result<Option<OcrCacheEntry>, CacheError> {
        Ok(self.entries.lock().await.get(hash).cloned())
    }

    async fn store(&self, entry: &OcrCacheEntry) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&entry.page_hash) {
            return Ok(false);
        }
        entries.insert(entry.page_hash.clone(), entry.clone());
        Ok(true)
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, CacheError> {
        Ok(self.entries.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::page_hash;

    fn entry_for(page: usize, text: &str) -> OcrCacheEntry {
        let path = PathBuf::from("/tmp/proposal.pdf");
        OcrCacheEntry {
            page_hash: page_hash(&path, page),
            source_path: path,
            page_number: page,
            extracted_text: text.to_string(),
            model_used: "gpt-4o".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_cache_roundtrip() {
        let cache = MemoryOcrCache::new();
        let entry = entry_for(0, "transcribed text");
        assert!(cache.store(&entry).await.unwrap());
        let found = cache.lookup(&entry.page_hash).await.unwrap().unwrap();
        assert_eq!(found.extracted_text, "transcribed text");
    }

    #[tokio::test]
    async fn memory_cache_keeps_first_entry() {
        let cache = MemoryOcrCache::new();
        let first = entry_for(0, "first transcription");
        let second = entry_for(0, "second transcription");
        assert!(cache.store(&first).await.unwrap());
        assert!(!cache.store(&second).await.unwrap());
        let found = cache.lookup(&first.page_hash).await.unwrap().unwrap();
        assert_eq!(found.extracted_text, "first transcription");
    }

    #[tokio::test]
    async fn memory_cache_clear_reports_removed() {
        let cache = MemoryOcrCache::new();
        cache.store(&entry_for(0, "a")).await.unwrap();
        cache.store(&entry_for(1, "b")).await.unwrap();
        assert_eq!(cache.count().await.unwrap(), 2);
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sqlite_cache_roundtrip_in_memory() {
        let cache = SqliteOcrCache::open_in_memory().unwrap();
        let entry = entry_for(3, "scanned page text");
        assert!(cache.store(&entry).await.unwrap());
        let found = cache.lookup(&entry.page_hash).await.unwrap().unwrap();
        assert_eq!(found.page_number, 3);
        assert_eq!(found.extracted_text, "scanned page text");
        assert_eq!(found.model_used, "gpt-4o");
        assert_eq!(found.page_hash, entry.page_hash);
    }

    #[tokio::test]
    async fn sqlite_store_is_idempotent() {
        let cache = SqliteOcrCache::open_in_memory().unwrap();
        let first = entry_for(1, "first");
        let second = entry_for(1, "second");
        assert!(cache.store(&first).await.unwrap());
        assert!(!cache.store(&second).await.unwrap());
        let found = cache.lookup(&first.page_hash).await.unwrap().unwrap();
        assert_eq!(found.extracted_text, "first");
        assert_eq!(cache.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sqlite_lookup_miss_is_none() {
        let cache = SqliteOcrCache::open_in_memory().unwrap();
        let hash = page_hash(Path::new("/tmp/missing.pdf"), 0);
        assert!(cache.lookup(&hash).await.unwrap().is_none());
    }
}
