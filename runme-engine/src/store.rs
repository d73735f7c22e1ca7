//! Document storage edge
//!
//! The orchestrator never touches the filesystem directly. Reads and writes
//! go through [`DocumentStore`] so hosts can plug in editor buffers, remote
//! storage or the in-memory store used by tests.

use ::async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Key identifying one document across saves, usually its path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for DocumentKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&Path> for DocumentKey {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for DocumentKey {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {key}")]
    NotFound { key: DocumentKey },

    #[error("I/O error on {key}: {source}")]
    Io {
        key: DocumentKey,
        #[source]
        source: std::io::Error,
    },
}

/// Async storage for notebook text.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the full text of a document.
    async fn read(&self, key: &DocumentKey) -> Result<String, StoreError>;

    /// Replace the full text of a document.
    async fn write(&self, key: &DocumentKey, text: &str) -> Result<(), StoreError>;
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// Filesystem store; keys are paths, resolved against an optional root.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentStore {
    root: Option<PathBuf>,
}

impl FsDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative keys against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, key: &DocumentKey) -> PathBuf {
        match &self.root {
            Some(root) if key.as_path().is_relative() => root.join(key.as_path()),
            _ => key.as_path().to_path_buf(),
        }
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, key: &DocumentKey) -> Result<String, StoreError> {
        let path = self.resolve(key);
        tokio::fs::read_to_string(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound { key: key.clone() }
            } else {
                StoreError::Io {
                    key: key.clone(),
                    source,
                }
            }
        })
    }

    async fn write(&self, key: &DocumentKey, text: &str) -> Result<(), StoreError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    key: key.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&path, text)
            .await
            .map_err(|source| StoreError::Io {
                key: key.clone(),
                source,
            })
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// In-memory store that counts writes.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<DocumentKey, String>,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<DocumentKey>, text: impl Into<String>) {
        self.documents.insert(key.into(), text.into());
    }

    pub fn get(&self, key: &DocumentKey) -> Option<String> {
        self.documents.get(key).map(|text| text.value().clone())
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, key: &DocumentKey) -> Result<String, StoreError> {
        self.get(key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    async fn write(&self, key: &DocumentKey, text: &str) -> Result<(), StoreError> {
        self.documents.insert(key.clone(), text.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// SESSION OUTPUTS
// ============================================================================

/// Path of the session outputs document for `notebook` and `session_id`.
///
/// `<stem>-<session_id>.md`, next to the notebook unless `outputs_dir` is
/// given.
pub fn outputs_path(notebook: &Path, session_id: &str, outputs_dir: Option<&Path>) -> PathBuf {
    let stem = notebook
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{stem}-{session_id}.md");
    match outputs_dir {
        Some(dir) => dir.join(file_name),
        None => notebook.with_file_name(file_name),
    }
}

/// `target` as a `/`-separated path relative to the directory `base`.
///
/// `None` when one path is absolute and the other is not, or when `base`
/// climbs out through `..` past the shared prefix.
pub fn relative_path(target: &Path, base: &Path) -> Option<String> {
    if target.is_absolute() != base.is_absolute() {
        return None;
    }
    let target: Vec<Component<'_>> = target
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let base: Vec<Component<'_>> = base
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();
    if base[common..].iter().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }

    let parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .chain(
            target[common..]
                .iter()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_path_next_to_notebook() {
        let path = outputs_path(Path::new("docs/README.md"), "01HFA08N6F66WSG09RR9XEP0T6", None);
        assert_eq!(path, PathBuf::from("docs/README-01HFA08N6F66WSG09RR9XEP0T6.md"));
    }

    #[test]
    fn test_outputs_path_in_outputs_dir() {
        let path = outputs_path(
            Path::new("docs/README.md"),
            "abc",
            Some(Path::new("/tmp/sessions")),
        );
        assert_eq!(path, PathBuf::from("/tmp/sessions/README-abc.md"));
    }

    #[test]
    fn test_relative_path_from_outputs_directory() {
        assert_eq!(
            relative_path(Path::new("docs/README.md"), Path::new("docs")).as_deref(),
            Some("README.md")
        );
        assert_eq!(
            relative_path(Path::new("README.md"), Path::new("")).as_deref(),
            Some("README.md")
        );
        assert_eq!(
            relative_path(Path::new("docs/README.md"), Path::new("sessions")).as_deref(),
            Some("../docs/README.md")
        );
        assert_eq!(
            relative_path(Path::new("/work/docs/README.md"), Path::new("/tmp/sessions")).as_deref(),
            Some("../../work/docs/README.md")
        );
        assert_eq!(relative_path(Path::new("/abs/README.md"), Path::new("rel")), None);
    }

    #[test]
    fn test_fs_store_resolves_relative_keys() {
        let store = FsDocumentStore::with_root("/work");
        assert_eq!(store.resolve(&"a/b.md".into()), PathBuf::from("/work/a/b.md"));
        assert_eq!(store.resolve(&"/abs.md".into()), PathBuf::from("/abs.md"));
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::with_root(dir.path());
        let key = DocumentKey::from("nested/notes.md");

        store.write(&key, "# Notes\n").await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), "# Notes\n");
    }

    #[tokio::test]
    async fn test_fs_store_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::with_root(dir.path());
        let err = store.read(&"missing.md".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_memory_store_counts_writes() {
        let store = MemoryDocumentStore::new();
        let key = DocumentKey::from("a.md");
        store.write(&key, "x").await.unwrap();
        store.write(&key, "y").await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), "y");
        assert_eq!(store.writes(), 2);
    }
}
