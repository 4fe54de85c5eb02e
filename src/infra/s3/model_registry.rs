use anyhow::Result;
use async_trait::async_trait;
use citibike_demand::registry::{LinearModel, Model, ModelRegistry, artifact_path};
use tracing::info;

use super::{join_key, read_object};

/// Models published under `s3://<bucket>/<prefix>/<name>/v<version>/model.json`.
pub struct S3ModelRegistry {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3ModelRegistry {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl ModelRegistry for S3ModelRegistry {
    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_model(&self, name: &str, version: u32) -> Result<Box<dyn Model>> {
        let key = join_key(&self.prefix, &artifact_path(name, version));
        let bytes = read_object(&self.client, &self.bucket, &key).await?;
        let model = LinearModel::from_json(&bytes)?;

        info!(key = %key, columns = model.columns.len(), "Model loaded");
        Ok(Box::new(model))
    }
}
