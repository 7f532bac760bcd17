//! Publishing a trained artifact to S3.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::pipeline::{Pipeline, artifact};

/// Object key used when none is given: `models/car_price-<timestamp>.model`.
pub fn default_key(pipeline: &Pipeline) -> String {
    format!(
        "models/car_price-{}.model",
        pipeline.metadata.trained_at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Uploads the gzip-compressed artifact plus a JSON sidecar with its metadata.
#[tracing::instrument(skip(client, pipeline))]
pub async fn upload_artifact(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    pipeline: &Pipeline,
) -> Result<()> {
    let body = Bytes::from(artifact::to_bytes(pipeline)?);
    let size = body.len();

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .content_type("application/gzip")
        .send()
        .await
        .with_context(|| format!("S3 upload of s3://{bucket}/{key} failed"))?;

    let metadata = serde_json::to_vec(&pipeline.metadata)?;
    let metadata_key = format!("{key}.json");
    client
        .put_object()
        .bucket(bucket)
        .key(&metadata_key)
        .body(metadata.into())
        .content_type("application/json")
        .send()
        .await
        .with_context(|| format!("S3 upload of s3://{bucket}/{metadata_key} failed"))?;

    info!(bytes = size, "Artifact published");
    Ok(())
}
