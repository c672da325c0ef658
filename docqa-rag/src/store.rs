//! Durable storage for a [`VectorIndex`].
//!
//! # Format and trust boundary
//!
//! [`FileIndexStore`] writes a versioned JSON document with an explicit
//! field list:
//!
//! ```json
//! {
//!   "format": "docqa-index",
//!   "version": 1,
//!   "embedding_model": "text-embedding-3-small",
//!   "dimensions": 1536,
//!   "entries": [
//!     { "chunk": { "document_id": "a.txt", "position": 0, "text": "..." },
//!       "embedding": [0.01, ...] }
//!   ]
//! }
//! ```
//!
//! Decoding this format only ever produces plain data, so loading a file
//! cannot execute code. Unknown fields, a foreign format tag, an
//! unsupported version, vectors of the wrong length, and non-finite
//! components are all rejected as [`RagError::IndexCorrupt`]. A file from
//! an untrusted source can therefore at worst produce misleading retrieval
//! results, never a compromise of the loading process.
//!
//! Every persist is a whole-index replacement: the new content is written to
//! a uniquely named sibling file, flushed to disk, and renamed over the
//! target, so readers observe either the previous index or the new one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::document::IndexedEntry;
use crate::embedding::EmbeddingSpace;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Format tag written into every index file.
pub const INDEX_FORMAT: &str = "docqa-index";

/// Current index file version.
pub const INDEX_VERSION: u32 = 1;

/// A location that holds at most one persisted [`VectorIndex`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{FileIndexStore, IndexStore};
///
/// let store = FileIndexStore::new("data/index.json");
/// store.persist(&index).await?;
/// let restored = store.load().await?;
/// ```
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Replace whatever is stored with `index`.
    async fn persist(&self, index: &VectorIndex) -> Result<()>;

    /// Read the stored index.
    ///
    /// Fails with [`RagError::IndexNotFound`] if nothing has been persisted
    /// and [`RagError::IndexCorrupt`] if the stored data is unusable.
    async fn load(&self) -> Result<VectorIndex>;

    /// Human-readable description of the location, used in errors and logs.
    fn location(&self) -> String;
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    format: &'a str,
    version: u32,
    embedding_model: &'a str,
    dimensions: usize,
    entries: &'a [IndexedEntry],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexFile {
    format: String,
    version: u32,
    embedding_model: String,
    dimensions: usize,
    entries: Vec<IndexedEntry>,
}

/// Serialize an index into the versioned file format.
///
/// Non-finite vector components cannot be represented and are rejected.
pub fn encode_index(index: &VectorIndex, location: &str) -> Result<Vec<u8>> {
    let storage = |message: String| RagError::Storage { location: location.to_string(), message };

    if let Some(i) = index.entries().iter().position(|e| e.embedding.iter().any(|x| !x.is_finite()))
    {
        return Err(storage(format!("entry {i} contains a non-finite component")));
    }

    let file = IndexFileRef {
        format: INDEX_FORMAT,
        version: INDEX_VERSION,
        embedding_model: &index.space().model,
        dimensions: index.space().dimensions,
        entries: index.entries(),
    };
    serde_json::to_vec(&file).map_err(|e| storage(format!("failed to encode index: {e}")))
}

/// Parse and validate bytes produced by [`encode_index`].
pub fn decode_index(bytes: &[u8], location: &str) -> Result<VectorIndex> {
    let corrupt = |message: String| RagError::IndexCorrupt {
        location: location.to_string(),
        message,
    };

    let file: IndexFile =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("unreadable index: {e}")))?;

    if file.format != INDEX_FORMAT {
        return Err(corrupt(format!("unexpected format tag '{}'", file.format)));
    }
    if file.version != INDEX_VERSION {
        return Err(corrupt(format!(
            "unsupported index version {} (expected {INDEX_VERSION})",
            file.version
        )));
    }
    if file.embedding_model.trim().is_empty() {
        return Err(corrupt("missing embedding model".to_string()));
    }
    if file.dimensions == 0 {
        return Err(corrupt("dimensions must be positive".to_string()));
    }
    for (i, entry) in file.entries.iter().enumerate() {
        if entry.embedding.len() != file.dimensions {
            return Err(corrupt(format!(
                "entry {i} has {} dimensions, expected {}",
                entry.embedding.len(),
                file.dimensions
            )));
        }
        if entry.embedding.iter().any(|x| !x.is_finite()) {
            return Err(corrupt(format!("entry {i} contains a non-finite component")));
        }
    }

    VectorIndex::build(EmbeddingSpace::new(file.embedding_model, file.dimensions), file.entries)
        .map_err(|e| corrupt(e.to_string()))
}

/// Stores the index as a single JSON file.
#[derive(Debug, Clone)]
pub struct FileIndexStore {
    path: PathBuf,
}

impl FileIndexStore {
    /// Create a store backed by the file at `path`.
    ///
    /// Parent directories are created on the first persist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The index file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned());
        let name = name.unwrap_or_else(|| "index".to_string());
        self.path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
    }

    fn storage_error(&self, action: &str, err: std::io::Error) -> RagError {
        error!(location = %self.path.display(), error = %err, action, "index storage failed");
        RagError::Storage {
            location: self.path.display().to_string(),
            message: format!("failed to {action}: {err}"),
        }
    }

    async fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.storage_error("create index directory", e))?;
        }

        let tmp = self.temp_path();
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.storage_error("write index", e));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for FileIndexStore {
    async fn persist(&self, index: &VectorIndex) -> Result<()> {
        let bytes = encode_index(index, &self.location())?;
        self.write_atomically(&bytes).await?;
        info!(
            location = %self.path.display(),
            entries = index.len(),
            bytes = bytes.len(),
            "persisted index"
        );
        Ok(())
    }

    async fn load(&self) -> Result<VectorIndex> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound { location: self.location() });
            }
            Err(e) => {
                return Err(RagError::IndexCorrupt {
                    location: self.location(),
                    message: format!("failed to read index: {e}"),
                });
            }
        };
        let index = decode_index(&bytes, &self.location())?;
        debug!(location = %self.path.display(), entries = index.len(), "loaded index");
        Ok(index)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Keeps the encoded index in memory.
///
/// Goes through the same encode/decode path as [`FileIndexStore`], which
/// makes it a faithful stand-in for tests.
#[derive(Debug, Default)]
pub struct InMemoryIndexStore {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl InMemoryIndexStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn persist(&self, index: &VectorIndex) -> Result<()> {
        let bytes = encode_index(index, &self.location())?;
        *self.bytes.write().await = Some(bytes);
        Ok(())
    }

    async fn load(&self) -> Result<VectorIndex> {
        let guard = self.bytes.read().await;
        let bytes =
            guard.as_ref().ok_or_else(|| RagError::IndexNotFound { location: self.location() })?;
        decode_index(bytes, &self.location())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn sample_index() -> VectorIndex {
        let entries = vec![
            IndexedEntry {
                chunk: Chunk { document_id: "a.txt".into(), position: 0, text: "alpha".into() },
                embedding: vec![1.0, 0.0, 0.0],
            },
            IndexedEntry {
                chunk: Chunk { document_id: "a.txt".into(), position: 1, text: "beta".into() },
                embedding: vec![0.0, 1.0, 0.0],
            },
        ];
        VectorIndex::build(EmbeddingSpace::new("model-a", 3), entries).unwrap()
    }

    #[test]
    fn encode_decode_preserves_index() {
        let index = sample_index();
        let bytes = encode_index(&index, "test").unwrap();
        assert_eq!(decode_index(&bytes, "test").unwrap(), index);
    }

    #[test]
    fn non_finite_vectors_are_not_persisted() {
        let entries = vec![IndexedEntry {
            chunk: Chunk { document_id: "d".into(), position: 0, text: "t".into() },
            embedding: vec![f32::INFINITY],
        }];
        let index = VectorIndex::build(EmbeddingSpace::new("m", 1), entries).unwrap();
        assert!(matches!(encode_index(&index, "test"), Err(RagError::Storage { .. })));
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = decode_index(b"\x80not json", "test").unwrap_err();
        assert!(matches!(err, RagError::IndexCorrupt { .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = br#"{"format":"docqa-index","version":1,"embedding_model":"m","dimensions":1,
            "entries":[],"hook":"x"}"#;
        assert!(matches!(decode_index(json, "test"), Err(RagError::IndexCorrupt { .. })));
    }

    #[test]
    fn future_version_is_rejected() {
        let json = br#"{"format":"docqa-index","version":2,"embedding_model":"m","dimensions":1,
            "entries":[]}"#;
        let err = decode_index(json, "test").unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn dimension_mismatch_is_corrupt() {
        let json = br#"{"format":"docqa-index","version":1,"embedding_model":"m","dimensions":2,
            "entries":[{"chunk":{"document_id":"d","position":0,"text":"t"},"embedding":[1.0]}]}"#;
        let err = decode_index(json, "test").unwrap_err();
        assert!(
            matches!(err, RagError::IndexCorrupt { message, .. } if message.contains("entry 0"))
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIndexStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load().await, Err(RagError::IndexNotFound { .. })));
    }

    #[tokio::test]
    async fn persist_replaces_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIndexStore::new(dir.path().join("nested").join("index.json"));

        store.persist(&sample_index()).await.unwrap();
        let empty = VectorIndex::empty(EmbeddingSpace::new("model-a", 3));
        store.persist(&empty).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "temporary files left behind: {leftovers:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_see_whole_indexes_while_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileIndexStore::new(dir.path().join("index.json")));
        let first = sample_index();
        let second = VectorIndex::build(
            EmbeddingSpace::new("model-a", 3),
            vec![IndexedEntry {
                chunk: Chunk { document_id: "b.txt".into(), position: 0, text: "gamma".into() },
                embedding: vec![0.0, 0.0, 1.0],
            }],
        )
        .unwrap();
        store.persist(&first).await.unwrap();

        let writer = {
            let store = store.clone();
            let (first, second) = (first.clone(), second.clone());
            tokio::spawn(async move {
                for round in 0..50 {
                    let index = if round % 2 == 0 { &second } else { &first };
                    store.persist(index).await.unwrap();
                }
            })
        };

        let mut loads = 0;
        while !writer.is_finished() || loads < 50 {
            let loaded = store.load().await.unwrap();
            assert!(loaded == first || loaded == second, "torn index: {loaded:?}");
            loads += 1;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryIndexStore::new();
        assert!(matches!(store.load().await, Err(RagError::IndexNotFound { .. })));
        store.persist(&sample_index()).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 2);
    }
}
