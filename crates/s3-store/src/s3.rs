//! S3-based object store implementation
//!
//! Works against AWS S3 or any S3-compatible service (LocalStack, MinIO) when
//! an explicit endpoint is configured. Keys are used verbatim; there is no
//! key prefixing or sharding.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use pipeline::{Aggregate, ColdStoreReader, ColdStoreWriter, ResourceError, Row};
use serde::{Deserialize, Serialize};

use crate::codec::{decode_rows, encode_aggregate};
use crate::ObjectStoreError;

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Connection settings for [`S3ObjectStore`]
///
/// Passed through from the `[resources.s3]` configuration table.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    /// Custom endpoint for S3-compatible services. Enables path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Static credentials. When absent the default AWS provider chain is used.
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// S3-based object store
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store with the given configuration
    pub async fn new(config: &S3Config) -> Result<Self, ObjectStoreError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()));

        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "stockflow-config",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(ObjectStoreError::Backend(
                    "access_key and secret_key must be set together".to_string(),
                ))
            }
        }

        let sdk_config = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &config.endpoint_url {
            // S3-compatible services generally require path-style addressing
            s3_config = s3_config
                .endpoint_url(endpoint_url.clone())
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config.build());

        tracing::debug!(
            bucket = %config.bucket,
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    ObjectStoreError::Backend(format!("S3 get_object error: {}", service_err))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 body read error: {}", e)))?
            .into_bytes()
            .to_vec();

        tracing::debug!(key, size = data.len(), "Object fetched from S3");
        Ok(data)
    }

    async fn put_bytes(&self, key: &str, data: Vec<u8>) -> Result<(), ObjectStoreError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 put_object error: {}", e)))?;

        tracing::debug!(key, size, "Object stored in S3");
        Ok(())
    }
}

#[async_trait]
impl ColdStoreReader for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<Row>, ResourceError> {
        let data = self.get_bytes(key).await?;
        Ok(decode_rows(&data)?)
    }
}

#[async_trait]
impl ColdStoreWriter for S3ObjectStore {
    async fn put(&self, key: &str, value: &Aggregate) -> Result<(), ResourceError> {
        let data = encode_aggregate(value)?;
        Ok(self.put_bytes(key, data).await?)
    }
}
