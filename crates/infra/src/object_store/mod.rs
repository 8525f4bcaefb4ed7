//! Durable object storage boundary (`put` / `get`, read-after-write consistent).

pub mod fs;
pub mod in_memory;

use std::sync::Arc;

use vesselflow_core::ObjectRef;

use crate::error::StoreError;

pub use fs::FsObjectStore;
pub use in_memory::InMemoryObjectStore;

/// Blob storage for uploads and chunk payloads.
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `path`, replacing any previous object.
    fn put(&self, path: &str, bytes: Vec<u8>) -> Result<ObjectRef, StoreError>;

    fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StoreError>;
}

impl<T> ObjectStore for Arc<T>
where
    T: ObjectStore + ?Sized,
{
    fn put(&self, path: &str, bytes: Vec<u8>) -> Result<ObjectRef, StoreError> {
        (**self).put(path, bytes)
    }

    fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StoreError> {
        (**self).get(object)
    }
}
