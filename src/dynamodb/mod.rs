//! # DynamoDB Module
//!
//! Item-level access to the single course table.
//!
//! ## Components
//!
//! - `KeyValueStore`: The store contract the course repository is written against.
//! - `DynamoDb`: A client wrapper for table management and item operations.
//! - `TableStore`: A `DynamoDb` client bound to one table.
//! - `MemoryStore`: An in-memory store for tests and local runs.
//! - `Item`: A row of the table, convertible to and from serde types.
//! - `Table`: A table configuration with its global secondary indexes.
//!
//! ## Usage
//!
//! The AWS client reads its configuration from the environment:
//!
//! - `AWS_ACCESS_KEY_ID`: Your AWS access key ID.
//! - `AWS_SECRET_ACCESS_KEY`: Your AWS secret access key.
//! - `AWS_REGION`: The AWS region where the course table lives.
//!
//! Optionally, you can also set:
//! - `AWS_SESSION_TOKEN`: If you're using temporary credentials.
//! - `AWS_ENDPOINT_URL`: For using a custom endpoint (e.g., DynamoDB Local).
//!
//! ## Example
//!
//! ```no_run
//! use course_store::dynamodb::{DynamoDb, Item, KeyValueStore, Table};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = aws_config::load_from_env().await;
//! let ddb = DynamoDb::new(&config);
//!
//! let table = Table::course_table("playlab-courses");
//! ddb.create_table_if_not_exists(&table).await?;
//!
//! let store = ddb.table_store(table);
//! store
//!     .put(Item::key("COURSE#astro-12", "METADATA").set_string("name", "Astronomy"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub(crate) mod error;
mod item;
mod memory;
mod store;
mod table;

pub use client::{DynamoDb, TableStore};
pub use item::Item;
pub use memory::MemoryStore;
pub use store::{AttributeUpdate, KeyValueStore};
pub use table::{GlobalIndex, Table};
