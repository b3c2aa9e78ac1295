//! Opaque blob storage.
//!
//! The pipeline never inspects blob content; it only moves bytes between the
//! store and the provider. Production deployments plug in their own backend;
//! [`MemoryBlobStore`] ships for tests and embedded use.

use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Key-addressed binary storage.
pub trait BlobStore: Send + Sync {
    /// Fetch a blob. `None` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a blob, overwriting any existing value.
    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Delete a blob. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        Ok(blobs.get(key).cloned())
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        blobs.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryBlobStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.put("a", vec![1, 2, 3]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.len(), 1);

        store.delete("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let store = MemoryBlobStore::new();
        assert!(store.delete("never-stored").is_ok());
    }

    #[test]
    fn test_overwrite() {
        let store = MemoryBlobStore::new();
        store.put("k", vec![1]).unwrap();
        store.put("k", vec![2]).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(vec![2]));
    }
}
