//! Object Store Adapter.
//!
//! Section PDFs live in a blob store under `{course_code}/{object_name}`.
//! [`ObjectStore`] is the contract the repository uses; [`S3ObjectStore`]
//! talks to Amazon S3 and [`MemoryObjectStore`] keeps objects in memory.

mod memory;
mod s3;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Blob storage for course files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any existing object, and returns
    /// the key.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String>;

    /// Returns `None` when no object exists under `key`.
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deletes one object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys of every object starting with `prefix`, in lexicographic order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes every object under `prefix` and returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list_prefix(prefix).await?;
        for key in &keys {
            self.delete(key).await?;
        }
        Ok(keys.len())
    }
}

/// Reduces a stored file path to a bare object key.
///
/// Older rows stored the full virtual-hosted URL
/// (`https://{bucket}.s3.amazonaws.com/{key}`) instead of the key.
pub fn normalize_key(path: &str) -> &str {
    path.strip_prefix("https://")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(host, _)| host.ends_with(".s3.amazonaws.com"))
        .map(|(_, key)| key)
        .unwrap_or(path)
}
