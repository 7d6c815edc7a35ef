use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Content store boundary. Paths are opaque strings; the engine only uses
/// them as units of storage and retrieval.
pub trait BlobStore {
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError>;
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&self, path: &str) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(path) => write!(f, "blob not found: {}", path),
            StoreError::Io(err) => write!(f, "store io error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Filesystem store rooted at a directory. `put` creates missing parent
/// directories, mirroring how the upstream storage disk behaves.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let full = self.resolve(path);
        if !full.exists() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        fs::read(&full).map_err(StoreError::Io)
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        fs::write(&full, bytes).map_err(StoreError::Io)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        let full = self.resolve(path);
        if !full.exists() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        fs::remove_file(&full).map_err(StoreError::Io)
    }
}

/// In-memory store for tests and callers that stage bytes themselves.
#[derive(Default)]
pub struct MemBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemBlobStore {
    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs.contains_key(path)
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
pub(crate) fn temp_dir_for(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "sealpress_{}_{}_{}",
        label,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ))
}
