mod command_line;

use std::sync::Arc;

use anyhow::Result;
use course_store::dynamodb::{DynamoDb, Table};
use course_store::logging;
use course_store::objects::S3ObjectStore;
use course_store::utils::retry_with_backoff;
use course_store::{CourseRepository, CourseSession, ReadCache, Settings};
use tokio::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let settings = Settings::from_env();
    logging::init_logging(&settings.log_level)?;

    let sdk_config = aws_config::load_from_env().await;

    let ddb = DynamoDb::new(&sdk_config);
    ddb.check_auth().await?;

    let table = Table::course_table(settings.table_name.as_str());
    if let Some(output) = ddb.create_table_if_not_exists(&table).await? {
        if let Some(description) = output.table_description() {
            info!("Table status: {:?}", description.table_status());
        }
    }
    retry_with_backoff(
        || ddb.ensure_active(table.name()),
        Duration::from_secs(1),
        8,
    )
    .await?;

    let repo = CourseRepository::new(
        Arc::new(ddb.table_store(table.clone())),
        Arc::new(S3ObjectStore::new(&sdk_config, settings.bucket_name.as_str())),
        ReadCache::new(settings.cache_ttl(), settings.cache_max_entries),
    )
    .with_default_prompt(settings.default_assistant_prompt.as_str());
    info!(
        "Serving courses from table '{}' and bucket '{}'",
        settings.table_name, settings.bucket_name
    );

    let mut session = CourseSession::new(repo);
    command_line::run(&ddb, &table, &mut session).await
}
