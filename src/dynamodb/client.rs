use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    operation::{create_table::CreateTableOutput, describe_table::DescribeTableOutput},
    types::{
        AttributeDefinition, AttributeValue, BillingMode, GlobalSecondaryIndex,
        KeySchemaElement, KeyType, Projection, ProjectionType, Put, ScalarAttributeType,
        TableStatus, TransactWriteItem,
    },
    Client,
};
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::dynamodb::error::{
    map_delete_item_error, map_get_item_error, map_put_item_error, map_query_error,
    map_transact_write_error, map_update_item_error,
};
use crate::dynamodb::{AttributeUpdate, Item, KeyValueStore, Table};
use crate::error::{RepositoryError, Result};

/// DynamoDB client wrapper for high-level operations.
///
/// Wraps the AWS SDK client with table management (create with secondary
/// indexes, describe, delete) and the item operations the course repository
/// needs. Item operations are bound to one table through [`TableStore`].
///
/// # Example
///
/// ```no_run
/// use course_store::dynamodb::{DynamoDb, Table};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = aws_config::load_from_env().await;
/// let ddb = DynamoDb::new(&config);
///
/// let table = Table::course_table("playlab-courses");
/// ddb.create_table_if_not_exists(&table).await?;
/// let store = ddb.table_store(table);
/// # Ok(())
/// # }
/// ```
///
/// # Error Handling
///
/// Table management returns `anyhow::Result` like the rest of the admin
/// tooling. Item operations return [`RepositoryError`] so the repository can
/// tell conflicts and missing items apart from service failures.
#[derive(Debug, Clone)]
pub struct DynamoDb {
    client: Client,
}

impl DynamoDb {
    /// Creates a new `DynamoDb` instance.
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    /// Verifies authentication by attempting to list tables.
    pub async fn check_auth(&self) -> anyhow::Result<()> {
        self.client.list_tables().send().await.map_err(|e| {
            error!("Authentication failed: {}", e);
            anyhow!("Authentication failed")
        })?;
        info!("Authentication successful");
        Ok(())
    }

    /// Binds item operations to a table.
    pub fn table_store(&self, table: Table) -> TableStore {
        TableStore {
            ddb: self.clone(),
            table,
        }
    }

    // --- Table Operations ---

    /// Creates a table, with its global secondary indexes, if it doesn't exist.
    pub async fn create_table_if_not_exists(
        &self,
        table: &Table,
    ) -> anyhow::Result<Option<CreateTableOutput>> {
        if self.table_exists(table.name()).await? {
            info!("Table '{}' exists", table.name());
            return Ok(None);
        }

        let mut key_schema = vec![KeySchemaElement::builder()
            .attribute_name(table.partition_key())
            .key_type(KeyType::Hash)
            .build()?];

        if let Some(sort_key) = table.sort_key() {
            key_schema.push(
                KeySchemaElement::builder()
                    .attribute_name(sort_key)
                    .key_type(KeyType::Range)
                    .build()?,
            );
        }

        let mut global_indexes = Vec::with_capacity(table.indexes().len());
        for index in table.indexes() {
            let mut index_schema = vec![KeySchemaElement::builder()
                .attribute_name(index.partition_key())
                .key_type(KeyType::Hash)
                .build()?];

            if let Some(sort_key) = index.sort_key() {
                index_schema.push(
                    KeySchemaElement::builder()
                        .attribute_name(sort_key)
                        .key_type(KeyType::Range)
                        .build()?,
                );
            }

            global_indexes.push(
                GlobalSecondaryIndex::builder()
                    .index_name(index.name())
                    .set_key_schema(Some(index_schema))
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::All)
                            .build(),
                    )
                    .build()?,
            );
        }

        let attribute_definitions = table
            .key_attributes()
            .into_iter()
            .map(|name| {
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let output = self
            .client
            .create_table()
            .table_name(table.name())
            .billing_mode(BillingMode::PayPerRequest)
            .set_attribute_definitions(Some(attribute_definitions))
            .set_key_schema(Some(key_schema))
            .set_global_secondary_indexes(
                (!global_indexes.is_empty()).then_some(global_indexes),
            )
            .send()
            .await?;
        info!("Table '{}' created", table.name());
        Ok(Some(output))
    }

    /// Deletes a table if it exists.
    pub async fn delete_table(&self, table_name: &str) -> anyhow::Result<()> {
        self.client
            .delete_table()
            .table_name(table_name)
            .send()
            .await?;
        info!("Table '{table_name}' deleted");
        Ok(())
    }

    /// Checks if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> anyhow::Result<bool> {
        let tables = self.client.list_tables().send().await?;
        Ok(tables.table_names().contains(&table_name.to_string()))
    }

    /// Retrieves table description.
    pub async fn describe_table(&self, table_name: &str) -> anyhow::Result<DescribeTableOutput> {
        self.client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(Into::into)
    }

    /// Fails unless the table is `ACTIVE`; pair with `retry_with_backoff`
    /// while a freshly created table comes up.
    pub async fn ensure_active(&self, table_name: &str) -> anyhow::Result<()> {
        let description = self.describe_table(table_name).await?;
        match description.table().and_then(|t| t.table_status()) {
            Some(TableStatus::Active) => Ok(()),
            status => Err(anyhow!("Table '{table_name}' is not active yet: {status:?}")),
        }
    }

    // --- Item Operations ---

    /// Puts an item into a DynamoDB table, optionally only when its key is free.
    pub async fn put_item(&self, table: &Table, item: Item, if_absent: bool) -> Result<()> {
        let id = describe_key(&item);
        let mut request = self
            .client
            .put_item()
            .table_name(table.name())
            .set_item(Some(item.attributes));
        if if_absent {
            request = request.condition_expression(format!(
                "attribute_not_exists({})",
                table.partition_key()
            ));
        }
        request
            .send()
            .await
            .map_err(|e| map_put_item_error(e, id.clone()))?;

        debug!("Item {id} put into '{}'", table.name());
        Ok(())
    }

    /// Puts a single item inside a write transaction.
    pub async fn transact_put_item(&self, table: &Table, item: Item) -> Result<()> {
        let id = describe_key(&item);
        let put = Put::builder()
            .table_name(table.name())
            .set_item(Some(item.attributes))
            .build()
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;

        self.client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .send()
            .await
            .map_err(map_transact_write_error)?;

        debug!("Item {id} written transactionally to '{}'", table.name());
        Ok(())
    }

    /// Gets an item from a DynamoDB table.
    pub async fn get_item(&self, table: &Table, key: Item) -> Result<Option<Item>> {
        let response = self
            .client
            .get_item()
            .table_name(table.name())
            .set_key(Some(key.attributes))
            .send()
            .await
            .map_err(map_get_item_error)?;

        Ok(response.item.map(|attrs| Item { attributes: attrs }))
    }

    /// Applies SET/REMOVE updates to an existing item.
    pub async fn update_item(
        &self,
        table: &Table,
        key: Item,
        updates: Vec<AttributeUpdate>,
    ) -> Result<()> {
        let id = describe_key(&key);
        let mut set_clauses = Vec::new();
        let mut remove_clauses = Vec::new();
        let mut expression_attribute_names = HashMap::new();
        let mut expression_attribute_values = HashMap::new();

        for (i, update) in updates.into_iter().enumerate() {
            let placeholder = format!("#attr{i}");
            expression_attribute_names.insert(
                placeholder.clone(),
                update.attribute_name().to_string(),
            );
            match update {
                AttributeUpdate::Set(_, value) => {
                    let value_placeholder = format!(":val{i}");
                    set_clauses.push(format!("{placeholder} = {value_placeholder}"));
                    expression_attribute_values.insert(value_placeholder, value);
                }
                AttributeUpdate::Remove(_) => remove_clauses.push(placeholder),
            }
        }

        if set_clauses.is_empty() && remove_clauses.is_empty() {
            return Ok(());
        }

        let mut update_expression = String::new();
        if !set_clauses.is_empty() {
            update_expression.push_str(&format!("SET {}", set_clauses.join(", ")));
        }
        if !remove_clauses.is_empty() {
            if !update_expression.is_empty() {
                update_expression.push(' ');
            }
            update_expression.push_str(&format!("REMOVE {}", remove_clauses.join(", ")));
        }

        self.client
            .update_item()
            .table_name(table.name())
            .set_key(Some(key.attributes))
            .update_expression(update_expression)
            .condition_expression(format!("attribute_exists({})", table.partition_key()))
            .set_expression_attribute_names(Some(expression_attribute_names))
            .set_expression_attribute_values(
                (!expression_attribute_values.is_empty()).then_some(expression_attribute_values),
            )
            .send()
            .await
            .map_err(|e| map_update_item_error(e, id.clone()))?;

        debug!("Item {id} updated in '{}'", table.name());
        Ok(())
    }

    /// Deletes an item from a DynamoDB table.
    pub async fn delete_item(&self, table: &Table, key: Item) -> Result<()> {
        let id = describe_key(&key);
        self.client
            .delete_item()
            .table_name(table.name())
            .set_key(Some(key.attributes))
            .send()
            .await
            .map_err(map_delete_item_error)?;

        debug!("Item {id} deleted from '{}'", table.name());
        Ok(())
    }

    // --- Query Operations ---

    /// Queries one partition of the table or of a global secondary index,
    /// following pagination until every matching item is read.
    ///
    /// With `index` set, the key names come from that index. `sort_key`
    /// narrows the query with `begins_with` when `sort_key_prefix` is true and
    /// with equality otherwise.
    pub async fn query_items(
        &self,
        table: &Table,
        index: Option<&str>,
        partition_value: &str,
        sort_key: Option<(&str, bool)>,
    ) -> Result<Vec<Item>> {
        let (pk_name, sk_name) = match index {
            Some(name) => {
                let index = table.index(name).ok_or_else(|| {
                    RepositoryError::QueryFailed(format!("Unknown index '{name}'"))
                })?;
                (index.partition_key(), index.sort_key())
            }
            None => (table.partition_key(), table.sort_key()),
        };

        let mut key_condition_expression = "#pk = :pkval".to_string();
        let mut expression_attribute_names = HashMap::from([("#pk".to_string(), pk_name.to_string())]);
        let mut expression_attribute_values = HashMap::from([(
            ":pkval".to_string(),
            AttributeValue::S(partition_value.to_string()),
        )]);

        if let Some((value, is_prefix)) = sort_key {
            let sk_name = sk_name.ok_or_else(|| {
                RepositoryError::QueryFailed("Sort key condition on a hash-only key".to_string())
            })?;
            key_condition_expression.push_str(if is_prefix {
                " AND begins_with(#sk, :skval)"
            } else {
                " AND #sk = :skval"
            });
            expression_attribute_names.insert("#sk".to_string(), sk_name.to_string());
            expression_attribute_values
                .insert(":skval".to_string(), AttributeValue::S(value.to_string()));
        }

        let mut items = Vec::new();
        let mut last_evaluated_key = None;

        loop {
            let response = self
                .client
                .query()
                .table_name(table.name())
                .set_index_name(index.map(str::to_string))
                .key_condition_expression(&key_condition_expression)
                .set_expression_attribute_names(Some(expression_attribute_names.clone()))
                .set_expression_attribute_values(Some(expression_attribute_values.clone()))
                .set_exclusive_start_key(last_evaluated_key)
                .send()
                .await
                .map_err(map_query_error)?;

            if let Some(new_items) = response.items {
                items.extend(new_items.into_iter().map(|attrs| Item { attributes: attrs }));
            }

            last_evaluated_key = response.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

fn describe_key(item: &Item) -> String {
    format!("{}/{}", item.pk().unwrap_or("?"), item.sk().unwrap_or("?"))
}

/// A [`DynamoDb`] client bound to one table, usable as a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct TableStore {
    ddb: DynamoDb,
    table: Table,
}

impl TableStore {
    pub fn table(&self) -> &Table {
        &self.table
    }
}

#[async_trait]
impl KeyValueStore for TableStore {
    async fn put(&self, item: Item) -> Result<()> {
        self.ddb.put_item(&self.table, item, false).await
    }

    async fn put_if_absent(&self, item: Item) -> Result<()> {
        self.ddb.put_item(&self.table, item, true).await
    }

    async fn transact_put(&self, item: Item) -> Result<()> {
        self.ddb.transact_put_item(&self.table, item).await
    }

    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Item>> {
        self.ddb.get_item(&self.table, Item::key(pk, sk)).await
    }

    async fn query(&self, pk: &str, sk_prefix: Option<&str>) -> Result<Vec<Item>> {
        self.ddb
            .query_items(&self.table, None, pk, sk_prefix.map(|prefix| (prefix, true)))
            .await
    }

    async fn query_index(&self, index_pk: &str, index_sk: Option<&str>) -> Result<Vec<Item>> {
        let index = self
            .table
            .indexes()
            .first()
            .map(|index| index.name().to_string())
            .ok_or_else(|| RepositoryError::QueryFailed("Table has no index".to_string()))?;
        self.ddb
            .query_items(
                &self.table,
                Some(&index),
                index_pk,
                index_sk.map(|sk| (sk, false)),
            )
            .await
    }

    async fn update(&self, pk: &str, sk: &str, updates: Vec<AttributeUpdate>) -> Result<()> {
        self.ddb
            .update_item(&self.table, Item::key(pk, sk), updates)
            .await
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<()> {
        self.ddb.delete_item(&self.table, Item::key(pk, sk)).await
    }
}
