//! Loading raw bytes from a local path or an HTTP(S) URL.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("GET {url} returned {status}");
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Reads `source` from disk, or downloads it when it looks like a URL.
#[tracing::instrument]
pub async fn read_source(source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        let client = BasicClient::new();
        fetch_bytes(&client, source).await?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read {source}"))?
    };
    tracing::debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}
