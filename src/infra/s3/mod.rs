//! S3-backed feature store and model registry.
//!
//! [`S3FeatureStore`] keeps group metadata as JSON and each write as a
//! gzip-compressed CSV part. [`S3ModelRegistry`] reads model artifacts with the
//! same key layout as the local registry.

mod feature_store;
mod model_registry;

pub use feature_store::S3FeatureStore;
pub use model_registry::S3ModelRegistry;

use anyhow::{Context, Result};
use serde::Serialize;

/// Joins a key prefix and a relative key, ignoring an empty prefix.
pub(crate) fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Serializes a value to JSON and uploads it with `application/json` content type.
pub(crate) async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body.into())
        .content_type("application/json")
        .send()
        .await
        .with_context(|| format!("uploading s3://{bucket}/{key}"))?;

    Ok(())
}

/// Downloads an object's full body.
pub(crate) async fn read_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<bytes::Bytes> {
    let resp = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| format!("downloading s3://{bucket}/{key}"))?;

    let body = resp
        .body
        .collect()
        .await
        .with_context(|| format!("reading body of s3://{bucket}/{key}"))?;
    Ok(body.into_bytes())
}
