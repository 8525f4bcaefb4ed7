use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vesselflow_core::ObjectRef;

use super::ObjectStore;
use crate::error::StoreError;

/// In-memory object store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Paths currently stored under `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        let Ok(objects) = self.objects.read() else {
            return Vec::new();
        };
        let mut paths: Vec<String> = objects
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, path: &str, bytes: Vec<u8>) -> Result<ObjectRef, StoreError> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StoreError::storage("object store lock poisoned"))?;
        objects.insert(path.to_string(), bytes);
        Ok(ObjectRef::new(path))
    }

    fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StoreError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| StoreError::storage("object store lock poisoned"))?;
        objects
            .get(object.path())
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(object.to_string()))
    }
}
