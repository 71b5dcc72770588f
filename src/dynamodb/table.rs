use std::collections::BTreeSet;

use crate::keys;

/// DynamoDB table configuration.
///
/// A table is identified by its name and primary key attributes (a partition
/// key and an optional sort key). Tables may additionally declare global
/// secondary indexes, each with its own partition and optional sort key.
///
/// # Example
///
/// ```
/// use course_store::dynamodb::{GlobalIndex, Table};
///
/// let table = Table::new("playlab-courses", "PK", Some("SK"))
///     .with_index(GlobalIndex::new("GSI1", "GSI1PK", Some("GSI1SK")));
/// assert_eq!(table.indexes().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    partition_key: String,
    sort_key: Option<String>,
    indexes: Vec<GlobalIndex>,
}

/// A global secondary index declaration.
///
/// Indexes project all attributes so that index queries return full rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalIndex {
    name: String,
    partition_key: String,
    sort_key: Option<String>,
}

impl GlobalIndex {
    pub fn new(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: sort_key.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }
}

impl Table {
    /// Creates a new `Table` instance.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the DynamoDB table.
    /// * `partition_key` - The name of the partition key attribute.
    /// * `sort_key` - The name of the sort key attribute, if any.
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>, sort_key: Option<&str>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: sort_key.map(str::to_string),
            indexes: Vec::new(),
        }
    }

    /// The single-table course layout: `PK`/`SK` plus `GSI1` on
    /// `GSI1PK`/`GSI1SK`.
    pub fn course_table(name: impl Into<String>) -> Self {
        Self::new(name, keys::PK, Some(keys::SK)).with_index(GlobalIndex::new(
            keys::GSI1,
            keys::GSI1_PK,
            Some(keys::GSI1_SK),
        ))
    }

    /// Returns the name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the partition key of the table.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Returns the sort key of the table, if any.
    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Adds a global secondary index and returns the modified `Table`.
    pub fn with_index(mut self, index: GlobalIndex) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn indexes(&self) -> &[GlobalIndex] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&GlobalIndex> {
        self.indexes.iter().find(|index| index.name() == name)
    }

    /// Every attribute used by the table key or an index key, each named once.
    ///
    /// DynamoDB rejects a `CreateTable` whose attribute definitions repeat a
    /// name, and an index may reuse the table's own key attributes.
    pub fn key_attributes(&self) -> BTreeSet<&str> {
        let table_keys = std::iter::once(self.partition_key()).chain(self.sort_key());
        let index_keys = self
            .indexes
            .iter()
            .flat_map(|index| std::iter::once(index.partition_key()).chain(index.sort_key()));
        table_keys.chain(index_keys).collect()
    }
}
