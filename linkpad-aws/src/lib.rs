/// AWS storage backends for Linkpad
///
/// Records live in a DynamoDB table keyed by `code`; blob-tier payloads live
/// in an S3 bucket under `S/{code}.zst`. SDK failures are classified into
/// [`linkpad_core::BackendError`] here, at the SDK boundary.

pub mod error;
pub mod dynamodb;
pub mod s3;

pub use dynamodb::DynamoMetadataBackend;
pub use s3::S3BlobBackend;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

pub const ENV_REGION: &str = "LINKPAD_AWS_REGION";
pub const ENV_TABLE: &str = "LINKPAD_TABLE";
pub const ENV_BUCKET: &str = "LINKPAD_BUCKET";
pub const ENV_ENDPOINT_URL: &str = "LINKPAD_ENDPOINT_URL";

/// Where the AWS backends point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
    pub table: String,
    pub bucket: String,
    /// Custom endpoint, e.g. a local DynamoDB or MinIO
    pub endpoint_url: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            table: "linkpad_records".to_string(),
            bucket: "linkpad-data".to_string(),
            endpoint_url: None,
        }
    }
}

impl AwsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`; empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            region: get(ENV_REGION).unwrap_or(defaults.region),
            table: get(ENV_TABLE).unwrap_or(defaults.table),
            bucket: get(ENV_BUCKET).unwrap_or(defaults.bucket),
            endpoint_url: get(ENV_ENDPOINT_URL),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Loads the shared SDK configuration (credentials chain, region,
    /// optional endpoint).
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()));

        match &self.endpoint_url {
            Some(endpoint) => builder.endpoint_url(endpoint).load().await,
            None => builder.load().await,
        }
    }
}

/// Builds both backends from one SDK configuration.
pub async fn connect(config: &AwsConfig) -> (DynamoMetadataBackend, S3BlobBackend) {
    info!(
        "Connecting to AWS (region {}, table {}, bucket {})",
        config.region, config.table, config.bucket
    );
    let sdk = config.load_sdk_config().await;
    (
        DynamoMetadataBackend::new(aws_sdk_dynamodb::Client::new(&sdk), &config.table),
        S3BlobBackend::new(aws_sdk_s3::Client::new(&sdk), &config.bucket),
    )
}
