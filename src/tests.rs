//! Live tests against DynamoDB and S3.
//!
//! These tests cover:
//! - Course table creation with the `GSI1` index
//! - Item operations through `TableStore`, including conditional writes
//! - S3 object upload, download, listing and prefix deletes
//! - A full course lifecycle through the repository and session
//!
//! # Setup
//!
//! These tests require a reachable DynamoDB instance, an S3 bucket and proper
//! AWS credentials. They are ignored by default.
//!
//! ## Credentials
//!
//! Set the following environment variables in your `.env` file:
//!
//! ```text
//! AWS_ACCESS_KEY_ID=your_access_key
//! AWS_SECRET_ACCESS_KEY=your_secret_key
//! AWS_REGION=your_preferred_region
//! TEST_COURSE_BUCKET_NAME=a_bucket_you_own
//! ```
//!
//! For local testing with DynamoDB Local, you can use dummy values and set:
//!
//! ```text
//! AWS_ENDPOINT_URL=http://localhost:8000
//! ```
//!
//! ## Test Table
//!
//! The tests use a table named "test-playlab-courses" with the course layout
//! (`PK`/`SK`, `GSI1` on `GSI1PK`/`GSI1SK`). It is created if missing.
//! Every test writes under a fresh course code and removes it afterwards.
//!
//! # Running Tests
//!
//! ```text
//! cargo test -- --ignored
//! ```
//!
//! Note: These tests may incur AWS charges if run against real AWS services.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cache::ReadCache;
use crate::dynamodb::{AttributeUpdate, DynamoDb, Item, KeyValueStore, Table, TableStore};
use crate::error::RepositoryError;
use crate::keys;
use crate::model::{CourseDraft, NewSection, SectionBody, SectionType};
use crate::objects::{ObjectStore, S3ObjectStore};
use crate::repository::CourseRepository;
use crate::session::CourseSession;
use crate::utils::retry_with_backoff;

const TEST_TABLE_NAME: &str = "test-playlab-courses";
const TEACHER_EMAIL: &str = "live-test@example.com";

fn unique_code() -> String {
    format!("it-{}", &Uuid::new_v4().simple().to_string()[..8])
}

fn test_bucket() -> Result<String> {
    std::env::var("TEST_COURSE_BUCKET_NAME")
        .map_err(|_| anyhow!("TEST_COURSE_BUCKET_NAME is not set"))
}

#[instrument]
async fn setup_test_table() -> Result<(aws_config::SdkConfig, DynamoDb, TableStore)> {
    dotenv::dotenv().ok();
    let sdk_config = aws_config::load_from_env().await;
    let ddb = DynamoDb::new(&sdk_config);

    let table = Table::course_table(TEST_TABLE_NAME);
    if ddb.create_table_if_not_exists(&table).await?.is_some() {
        info!("Test table created");
    }
    retry_with_backoff(
        || ddb.ensure_active(TEST_TABLE_NAME),
        Duration::from_secs(2),
        8,
    )
    .await
    .map_err(|e| anyhow!("Table never became active: {e:?}"))?;

    let store = ddb.table_store(table);
    Ok((sdk_config, ddb, store))
}

#[tokio::test]
#[ignore = "needs AWS credentials"]
async fn test_table_store_operations() -> Result<()> {
    let (_, ddb, store) = setup_test_table().await?;
    assert!(ddb.table_exists(TEST_TABLE_NAME).await?);

    let code = unique_code();
    let pk = keys::course_pk(&code);

    info!("Testing put_if_absent");
    let unit = Item::key(&pk, keys::unit_sk("u1"))
        .set_string("title", "Stars")
        .set_number("order", 1);
    store.put_if_absent(unit.clone()).await?;
    assert!(matches!(
        store.put_if_absent(unit).await,
        Err(RepositoryError::AlreadyExists { .. })
    ));

    info!("Testing get and query");
    let found = store.get(&pk, &keys::unit_sk("u1")).await?.ok_or_else(|| anyhow!("missing"))?;
    assert_eq!(found.get_string("title"), Some(&"Stars".to_string()));
    store
        .put(Item::key(&pk, keys::assistant_sk("a1")).set_string("name", "Helper"))
        .await?;
    assert_eq!(store.query(&pk, Some(keys::UNIT_PREFIX)).await?.len(), 1);
    assert_eq!(store.query(&pk, None).await?.len(), 2);

    info!("Testing update with SET and REMOVE");
    store
        .update(
            &pk,
            &keys::unit_sk("u1"),
            vec![
                AttributeUpdate::set_number("order", 2),
                AttributeUpdate::remove("title"),
            ],
        )
        .await?;
    let updated = store.get(&pk, &keys::unit_sk("u1")).await?.ok_or_else(|| anyhow!("missing"))?;
    assert_eq!(updated.get_number("order"), Some(2.0));
    assert!(!updated.contains("title"));
    assert!(matches!(
        store
            .update(&pk, &keys::unit_sk("ghost"), vec![AttributeUpdate::set_number("order", 1)])
            .await,
        Err(RepositoryError::NotFound { .. })
    ));

    info!("Testing query_index");
    let section_id = Uuid::new_v4().to_string();
    store
        .put(
            Item::key(keys::section_pk(&code, "u1"), keys::section_sk(&section_id))
                .set_string(keys::GSI1_PK, keys::section_gsi1_pk(&section_id))
                .set_string(keys::GSI1_SK, keys::section_gsi1_sk()),
        )
        .await?;
    let gsi1_pk = keys::section_gsi1_pk(&section_id);
    let indexed = retry_with_backoff(
        || async {
            match store.query_index(&gsi1_pk, None).await {
                Ok(items) if items.len() == 1 => Ok(items),
                Ok(_) => Err(anyhow!("index not caught up")),
                Err(e) => Err(e.into()),
            }
        },
        Duration::from_millis(500),
        6,
    )
    .await?;
    assert_eq!(indexed[0].pk(), Some(keys::section_pk(&code, "u1").as_str()));

    info!("Cleaning up test data");
    store.delete(&pk, &keys::unit_sk("u1")).await?;
    store.delete(&pk, &keys::assistant_sk("a1")).await?;
    store
        .delete(&keys::section_pk(&code, "u1"), &keys::section_sk(&section_id))
        .await?;
    assert!(store.query(&pk, None).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "needs AWS credentials and TEST_COURSE_BUCKET_NAME"]
async fn test_s3_object_operations() -> Result<()> {
    dotenv::dotenv().ok();
    let sdk_config = aws_config::load_from_env().await;
    let objects = S3ObjectStore::new(&sdk_config, test_bucket()?);

    let code = unique_code();
    let key = keys::course_object_key(&code, "s1.pdf");
    assert_eq!(objects.upload(&key, b"%PDF-1.7".to_vec()).await?, key);
    assert_eq!(objects.download(&key).await?, Some(b"%PDF-1.7".to_vec()));
    assert_eq!(
        objects.download(&keys::course_object_key(&code, "ghost.pdf")).await?,
        None
    );

    objects
        .upload(&keys::course_object_key(&code, "s2.pdf"), b"x".to_vec())
        .await?;
    assert_eq!(objects.list_prefix(&keys::course_object_prefix(&code)).await?.len(), 2);
    assert_eq!(objects.delete_prefix(&keys::course_object_prefix(&code)).await?, 2);
    assert!(objects.list_prefix(&keys::course_object_prefix(&code)).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "needs AWS credentials and TEST_COURSE_BUCKET_NAME"]
async fn test_course_lifecycle() -> Result<()> {
    let (sdk_config, _, store) = setup_test_table().await?;
    let repo = CourseRepository::new(
        Arc::new(store),
        Arc::new(S3ObjectStore::new(&sdk_config, test_bucket()?)),
        ReadCache::new(Duration::from_secs(60), 1000),
    );
    let code = unique_code();
    let copy = format!("{code}-copy");

    info!("Creating course {code}");
    repo.create_course(TEACHER_EMAIL, &code, &CourseDraft::new("Astronomy", "desc", 9))
        .await?;
    let unit = repo.create_unit(&code, "Stars", "Fusion").await?;
    repo.create_section(
        &code,
        &unit,
        NewSection::new("Intro", "", SectionBody::Content("# Stars".into())),
    )
    .await?;
    let file_section = Uuid::new_v4().to_string();
    let file_key = repo
        .upload_section_file(&code, &file_section, b"%PDF-1.7".to_vec())
        .await?;
    repo.create_section(
        &code,
        &unit,
        NewSection::new("Reading", "", SectionBody::File(file_key)).with_id(file_section.as_str()),
    )
    .await?;

    info!("Reading through the session");
    let mut session = CourseSession::new(repo.clone());
    let course = session
        .get_course(&code)
        .await
        .ok_or_else(|| anyhow!("course not found"))?;
    assert_eq!(course.name, "Astronomy");
    assert_eq!(course.section_count(), 2);

    let deep_link = retry_with_backoff(
        || async {
            match repo.get_section_location(&file_section).await {
                Ok(Some(location)) => Ok(location),
                _ => {
                    repo.cache().invalidate_all().await;
                    Err(anyhow!("index not caught up"))
                }
            }
        },
        Duration::from_millis(500),
        6,
    )
    .await?;
    assert_eq!(deep_link, (code.clone(), unit.clone()));
    assert!(session.initialize_section_from_id(&file_section).await);
    assert_eq!(session.section().map(|s| s.section_type), Some(SectionType::File));
    assert_eq!(session.pdf_bytes(), Some(&b"%PDF-1.7"[..]));

    info!("Copying to {copy}");
    let summary = repo
        .duplicate_course(TEACHER_EMAIL, &code, &copy, "Astronomy (Copy)")
        .await?;
    assert_eq!((summary.units, summary.sections, summary.degraded_sections), (1, 2, 0));

    info!("Cleaning up test data");
    repo.delete_course(TEACHER_EMAIL, &copy).await?;
    repo.delete_course(TEACHER_EMAIL, &code).await?;
    assert!(repo.get_course_metadata(&code).await?.is_none());
    assert!(repo.get_user_courses(TEACHER_EMAIL).await?.iter().all(|c| c.code != code));
    Ok(())
}
