use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use citibike_demand::store::{FeatureGroup, FeatureStore, GetOrCreate, GroupSpec, Table};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::{debug, info};

use super::{join_key, read_object, write_json_to_s3};

/// Feature groups in S3:
///
/// ```text
/// <prefix>/<name>/v<version>/group.json
/// <prefix>/<name>/v<version>/part-<timestamp>.csv.gz
/// ```
///
/// Writes append parts. Readers resolve upserts by keeping the row from the
/// newest part for each primary key; part names sort by write time.
pub struct S3FeatureStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3FeatureStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }
    }

    fn group_prefix(&self, spec: &GroupSpec) -> String {
        join_key(&self.prefix, &format!("{}/v{}", spec.name, spec.version))
    }
}

#[async_trait]
impl FeatureStore for S3FeatureStore {
    type Group = S3FeatureGroup;

    #[tracing::instrument(skip(self, spec), fields(bucket = %self.bucket, group = %spec.qualified_name()))]
    async fn get_or_create(&self, spec: &GroupSpec) -> Result<GetOrCreate<S3FeatureGroup>> {
        let group_prefix = self.group_prefix(spec);
        let metadata_key = format!("{group_prefix}/group.json");

        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&metadata_key)
            .send()
            .await;

        match head {
            Ok(_) => {
                let bytes = read_object(&self.client, &self.bucket, &metadata_key).await?;
                let existing: GroupSpec = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing s3://{}/{metadata_key}", self.bucket))?;
                spec.ensure_compatible(&existing)?;

                debug!("Using existing feature group");
                Ok(GetOrCreate::Existing(S3FeatureGroup {
                    client: self.client.clone(),
                    bucket: self.bucket.clone(),
                    group_prefix,
                    spec: existing,
                }))
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                write_json_to_s3(&self.client, &self.bucket, &metadata_key, spec).await?;

                info!("Created feature group");
                Ok(GetOrCreate::Created(S3FeatureGroup {
                    client: self.client.clone(),
                    bucket: self.bucket.clone(),
                    group_prefix,
                    spec: spec.clone(),
                }))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("checking s3://{}/{metadata_key}", self.bucket))),
        }
    }
}

pub struct S3FeatureGroup {
    client: aws_sdk_s3::Client,
    bucket: String,
    group_prefix: String,
    spec: GroupSpec,
}

#[async_trait]
impl FeatureGroup for S3FeatureGroup {
    fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    #[tracing::instrument(skip(self, table), fields(bucket = %self.bucket, rows = table.len()))]
    async fn write(&self, table: &Table) -> Result<usize> {
        table.column_indices(&self.spec.primary_key)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&table.to_csv_bytes()?)?;
        let compressed = encoder.finish()?;

        let key = format!(
            "{}/part-{}.csv.gz",
            self.group_prefix,
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(compressed))
            .content_type("text/csv")
            .content_encoding("gzip")
            .send()
            .await
            .with_context(|| format!("uploading s3://{}/{key}", self.bucket))?;

        info!(key = %key, "Feature group part uploaded");
        Ok(table.len())
    }
}
