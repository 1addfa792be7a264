//! Fetching raw asset bytes from their source location.
//!
//! Sources are plain strings: `http(s)://` URLs or local file paths. Every
//! failure mode here (unreachable host, non-success status, missing file)
//! surfaces as [`CacheError::DecodeFailed`], which keeps the failing entry
//! out of the cache so a later request retries the fetch.

use reqwest::Client;

use crate::caching::{CacheContents, CacheError};

pub async fn fetch(client: &Client, source: &str) -> CacheContents<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        fetch_url(client, source).await
    } else {
        fetch_file(source).await
    }
}

async fn fetch_url(client: &Client, url: &str) -> CacheContents<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CacheError::DecodeFailed(format!("download failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(CacheError::DecodeFailed(format!(
            "download failed: {url} returned {status}"
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| CacheError::DecodeFailed(format!("download failed: {e}")))?;
    Ok(bytes.to_vec())
}

async fn fetch_file(path: &str) -> CacheContents<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CacheError::DecodeFailed(format!("failed to read {path}: {e}")))
}
