use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;

use crate::dynamodb::Item;
use crate::error::Result;

/// One change applied by [`KeyValueStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeUpdate {
    Set(String, AttributeValue),
    Remove(String),
}

impl AttributeUpdate {
    pub fn set_string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set(name.into(), AttributeValue::S(value.into()))
    }

    pub fn set_number(name: impl Into<String>, value: impl Into<f64>) -> Self {
        Self::Set(name.into(), AttributeValue::N(value.into().to_string()))
    }

    pub fn remove(name: impl Into<String>) -> Self {
        Self::Remove(name.into())
    }

    pub fn attribute_name(&self) -> &str {
        match self {
            Self::Set(name, _) | Self::Remove(name) => name,
        }
    }
}

/// Item-level access to the single course table.
///
/// All operations touch one item or one partition. Results of `query` and
/// `query_index` come back in sort-key order.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes an item, replacing any item with the same key.
    async fn put(&self, item: Item) -> Result<()>;

    /// Writes an item only if no item with the same key exists.
    ///
    /// Fails with `AlreadyExists` otherwise.
    async fn put_if_absent(&self, item: Item) -> Result<()>;

    /// Writes an item in a single-item transaction, so it is never partially
    /// applied.
    async fn transact_put(&self, item: Item) -> Result<()>;

    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>>;

    /// All items of a partition, optionally restricted to sort keys starting
    /// with `sk_prefix`.
    async fn query(&self, pk: &str, sk_prefix: Option<&str>) -> Result<Vec<Item>>;

    /// Items whose `GSI1PK` equals `index_pk` (and `GSI1SK` equals
    /// `index_sk` when given).
    async fn query_index(&self, index_pk: &str, index_sk: Option<&str>) -> Result<Vec<Item>>;

    /// Applies attribute updates to an existing item.
    ///
    /// Fails with `NotFound` when the item does not exist.
    async fn update(&self, pk: &str, sk: &str, updates: Vec<AttributeUpdate>) -> Result<()>;

    /// Deletes an item. Deleting a missing item is not an error.
    async fn delete(&self, pk: &str, sk: &str) -> Result<()>;
}
