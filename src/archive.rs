//! Persistence of raw API responses and downloaded media.

use std::path::{Path, PathBuf};

use log::info;
use reqwest::Client;
use serde::Serialize;

use crate::api::send_for_bytes;
use crate::retry::RetryPolicy;

/// Writes `value` as pretty JSON to `<dir>/<id>.json`, creating `dir` if needed.
///
/// # Returns
///
/// The path of the written file.
pub async fn write_response<T: Serialize + ?Sized>(
    dir: &Path,
    id: &str,
    value: &T,
) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", id));
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(&path, json).await?;
    info!("Response archived to {}", path.display());
    Ok(path)
}

/// Downloads `url` into `path`, creating parent directories as needed.
pub async fn download_file(
    client: &Client,
    policy: &RetryPolicy,
    url: &str,
    path: &Path,
) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    info!("Downloading {} to {}", url, path.display());
    let bytes = policy
        .call("download", || send_for_bytes(client.get(url), "download"))
        .await?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    Ok(path.to_path_buf())
}
