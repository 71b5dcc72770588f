//! In-memory key-value store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::dynamodb::{AttributeUpdate, Item, KeyValueStore};
use crate::error::{RepositoryError, Result};
use crate::keys;

type Key = (String, String);

/// In-memory stand-in for the course table.
///
/// Rows live in a `BTreeMap` keyed by `(PK, SK)`, so partition scans come
/// back in sort-key order the way DynamoDB returns them. Data is lost when
/// the last clone is dropped.
///
/// The store can be switched unavailable to exercise failure paths, and it
/// counts read operations so callers can observe caching.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<RwLock<BTreeMap<Key, Item>>>,
    unavailable: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with `QueryFailed` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get`, `query` and `query_index` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::QueryFailed(
                "Store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn record_read(&self) -> Result<()> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn key_of(item: &Item) -> Result<Key> {
        match (item.pk(), item.sk()) {
            (Some(pk), Some(sk)) => Ok((pk.to_string(), sk.to_string())),
            _ => Err(RepositoryError::InvalidData(
                "Item is missing its primary key".to_string(),
            )),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, item: Item) -> Result<()> {
        self.check_available()?;
        let key = Self::key_of(&item)?;
        self.rows.write().await.insert(key, item);
        Ok(())
    }

    async fn put_if_absent(&self, item: Item) -> Result<()> {
        self.check_available()?;
        let key = Self::key_of(&item)?;
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Err(RepositoryError::already_exists(
                "Item",
                format!("{}/{}", key.0, key.1),
            ));
        }
        rows.insert(key, item);
        Ok(())
    }

    async fn transact_put(&self, item: Item) -> Result<()> {
        self.put(item).await
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        self.record_read()?;
        let rows = self.rows.read().await;
        Ok(rows.get(&(pk.to_string(), sk.to_string())).cloned())
    }

    async fn query(&self, pk: &str, sk_prefix: Option<&str>) -> Result<Vec<Item>> {
        self.record_read()?;
        let prefix = sk_prefix.unwrap_or("");
        let rows = self.rows.read().await;
        Ok(rows
            .range((pk.to_string(), prefix.to_string())..)
            .take_while(|((row_pk, row_sk), _)| row_pk == pk && row_sk.starts_with(prefix))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn query_index(&self, index_pk: &str, index_sk: Option<&str>) -> Result<Vec<Item>> {
        self.record_read()?;
        let rows = self.rows.read().await;
        let mut matches: Vec<Item> = rows
            .values()
            .filter(|item| item.get_string(keys::GSI1_PK).map(String::as_str) == Some(index_pk))
            .filter(|item| match index_sk {
                Some(sk) => item.get_string(keys::GSI1_SK).map(String::as_str) == Some(sk),
                None => true,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.get_string(keys::GSI1_SK).cmp(&b.get_string(keys::GSI1_SK)));
        Ok(matches)
    }

    async fn update(&self, pk: &str, sk: &str, updates: Vec<AttributeUpdate>) -> Result<()> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let item = rows
            .get_mut(&(pk.to_string(), sk.to_string()))
            .ok_or_else(|| RepositoryError::not_found("Item", format!("{pk}/{sk}")))?;

        for update in updates {
            match update {
                AttributeUpdate::Set(name, value) => {
                    item.attributes.insert(name, value);
                }
                AttributeUpdate::Remove(name) => {
                    item.attributes.remove(&name);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        self.check_available()?;
        self.rows
            .write()
            .await
            .remove(&(pk.to_string(), sk.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(code: &str, id: &str, order: u32) -> Item {
        Item::key(keys::course_pk(code), keys::unit_sk(id))
            .set_string("title", format!("Unit {id}"))
            .set_number("order", order)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        store.put(unit("astro-12", "u1", 1)).await.unwrap();

        let item = store.get("COURSE#astro-12", "UNIT#u1").await.unwrap().unwrap();
        assert_eq!(item.get_number("order"), Some(1.0));
        assert!(store.get("COURSE#astro-12", "UNIT#u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_if_absent_rejects_existing_key() {
        let store = MemoryStore::new();
        store.put_if_absent(unit("astro-12", "u1", 1)).await.unwrap();

        let result = store.put_if_absent(unit("astro-12", "u1", 2)).await;
        assert!(matches!(result, Err(RepositoryError::AlreadyExists { .. })));

        let item = store.get("COURSE#astro-12", "UNIT#u1").await.unwrap().unwrap();
        assert_eq!(item.get_number("order"), Some(1.0));
    }

    #[tokio::test]
    async fn test_query_is_scoped_to_partition_and_prefix() {
        let store = MemoryStore::new();
        store.put(unit("astro-12", "b", 2)).await.unwrap();
        store.put(unit("astro-12", "a", 1)).await.unwrap();
        store.put(unit("astro-123", "c", 1)).await.unwrap();
        store
            .put(Item::key("COURSE#astro-12", "METADATA").set_string("name", "Astronomy"))
            .await
            .unwrap();

        let units = store.query("COURSE#astro-12", Some("UNIT#")).await.unwrap();
        let sks: Vec<_> = units.iter().filter_map(|i| i.sk()).collect();
        assert_eq!(sks, vec!["UNIT#a", "UNIT#b"]);

        let all = store.query("COURSE#astro-12", None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_query_index() {
        let store = MemoryStore::new();
        for code in ["zoo-10", "art-11"] {
            store
                .put(
                    Item::key(keys::user_pk("t@example.com"), keys::course_link_sk(code))
                        .set_string(keys::GSI1_PK, keys::ALL_COURSES)
                        .set_string(keys::GSI1_SK, keys::course_link_sk(code)),
                )
                .await
                .unwrap();
        }

        let all = store.query_index(keys::ALL_COURSES, None).await.unwrap();
        let sks: Vec<_> = all.iter().filter_map(|i| i.get_string(keys::GSI1_SK)).collect();
        assert_eq!(sks, vec!["COURSE#art-11", "COURSE#zoo-10"]);

        let one = store
            .query_index(keys::ALL_COURSES, Some("COURSE#zoo-10"))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn test_update_sets_and_removes() {
        let store = MemoryStore::new();
        store
            .put(unit("astro-12", "u1", 1).set_string("content", "old"))
            .await
            .unwrap();

        store
            .update(
                "COURSE#astro-12",
                "UNIT#u1",
                vec![
                    AttributeUpdate::set_number("order", 5),
                    AttributeUpdate::remove("content"),
                ],
            )
            .await
            .unwrap();

        let item = store.get("COURSE#astro-12", "UNIT#u1").await.unwrap().unwrap();
        assert_eq!(item.get_number("order"), Some(5.0));
        assert!(!item.contains("content"));
    }

    #[tokio::test]
    async fn test_update_missing_item_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .update("COURSE#x-1", "UNIT#u", vec![AttributeUpdate::set_number("order", 1)])
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_item_is_ok() {
        let store = MemoryStore::new();
        store.delete("COURSE#x-1", "UNIT#u").await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.put(unit("astro-12", "u1", 1)).await.is_err());
        assert!(store.query("COURSE#astro-12", None).await.is_err());

        store.set_unavailable(false);
        store.put(unit("astro-12", "u1", 1)).await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
