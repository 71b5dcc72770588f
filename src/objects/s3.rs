use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{RepositoryError, Result};
use crate::objects::ObjectStore;

/// `DeleteObjects` accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

/// Amazon S3 bucket holding course files.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self::from_client(Client::new(sdk_config), bucket)
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::ObjectStore(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| RepositoryError::ObjectStore(e.to_string()))?;

        let response = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_s3_error(e, "<batch>"))?;

        if let Some(failed) = response.errors().first() {
            return Err(RepositoryError::ObjectStore(format!(
                "Failed to delete '{}': {}",
                failed.key().unwrap_or_default(),
                failed.message().unwrap_or("unknown error")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        debug!("Uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(key.to_string())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(map_s3_error(e, key)),
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| RepositoryError::ObjectStore(format!("Failed to read S3 body: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(Some(bytes))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, key))?;

        debug!("Deleted s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| map_s3_error(e, prefix))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list_prefix(prefix).await?;
        for batch in keys.chunks(DELETE_BATCH) {
            self.delete_batch(batch).await?;
        }

        info!("Deleted {} objects under s3://{}/{prefix}", keys.len(), self.bucket);
        Ok(keys.len())
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 404)
}

fn map_s3_error<E: std::fmt::Debug>(err: SdkError<E>, key: &str) -> RepositoryError {
    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            match status {
                403 => RepositoryError::ObjectStore(format!("Access denied for key '{key}'")),
                _ => RepositoryError::ObjectStore(format!(
                    "S3 error for key '{key}' (HTTP {status}): {err:?}"
                )),
            }
        }
        SdkError::TimeoutError(_) => {
            RepositoryError::ObjectStore(format!("S3 timeout for key '{key}'"))
        }
        SdkError::DispatchFailure(_) => {
            RepositoryError::ObjectStore(format!("S3 connection error for key '{key}': {err:?}"))
        }
        _ => RepositoryError::ObjectStore(format!("S3 error for key '{key}': {err:?}")),
    }
}
