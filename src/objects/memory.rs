use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{RepositoryError, Result};
use crate::objects::ObjectStore;

/// In-memory object store for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::ObjectStore(
                "Object store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        self.check_available()?;
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(key.to_string())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let store = MemoryObjectStore::new();
        let key = store.upload("astro-12/a.pdf", b"%PDF".to_vec()).await.unwrap();
        assert_eq!(key, "astro-12/a.pdf");

        assert_eq!(store.download(&key).await.unwrap(), Some(b"%PDF".to_vec()));

        store.delete(&key).await.unwrap();
        assert_eq!(store.download(&key).await.unwrap(), None);
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_prefix_leaves_other_courses() {
        let store = MemoryObjectStore::new();
        store.upload("astro-12/a.pdf", vec![1]).await.unwrap();
        store.upload("astro-12/b.pdf", vec![2]).await.unwrap();
        store.upload("astro-123/c.pdf", vec![3]).await.unwrap();

        let removed = store.delete_prefix("astro-12/").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.list_prefix("").await.unwrap(),
            vec!["astro-123/c.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryObjectStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.upload("a/b.pdf", vec![]).await,
            Err(RepositoryError::ObjectStore(_))
        ));
    }
}
