use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use vesselflow_core::ObjectRef;

use super::ObjectStore;
use crate::error::StoreError;

/// Object store backed by a local directory.
///
/// Object paths are relative, `/`-separated and may not escape the root.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Use `root` as the store directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(StoreError::storage)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, path: &str, bytes: Vec<u8>) -> Result<ObjectRef, StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::storage)?;
        }

        // Write-then-rename so readers never observe a partial object.
        let mut staging = target.clone().into_os_string();
        staging.push(".partial");
        std::fs::write(&staging, &bytes).map_err(StoreError::storage)?;
        std::fs::rename(&staging, &target).map_err(StoreError::storage)?;

        debug!(path, bytes = bytes.len(), "object written");
        Ok(ObjectRef::new(path))
    }

    fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StoreError> {
        let source = self.resolve(object.path())?;
        std::fs::read(&source).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::ObjectNotFound(object.to_string()),
            _ => StoreError::storage(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();

        let r = store.put("chunks/job-1/0.json", b"[]".to_vec()).unwrap();
        assert_eq!(store.get(&r).unwrap(), b"[]");
        assert!(dir.path().join("chunks/job-1/0.json").exists());
        assert!(!dir.path().join("chunks/job-1/0.json.partial").exists());
    }

    #[test]
    fn rejects_paths_escaping_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.put("../outside.csv", vec![1]),
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store.put("/etc/passwd", vec![1]),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get(&ObjectRef::new("uploads/none.csv")),
            Err(StoreError::ObjectNotFound(_))
        ));
    }
}
