//! Streaming archive download

use std::path::Path;

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;

use crate::install::error::{SetupError, SetupResult};

const USER_AGENT: &str = concat!("pearl-setup/", env!("CARGO_PKG_VERSION"));

/// HTTP client used for dependency downloads
pub fn build_client() -> SetupResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SetupError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Stream `url` into `dest`, returning the number of bytes written.
///
/// The response body is written chunk by chunk and never held in memory as a
/// whole. On any failure the partial file is removed, so a retry starts from
/// an empty destination.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> SetupResult<u64> {
    info!("Downloading {url} to {}. This might take a while...", dest.display());

    match stream_to_file(client, url, dest).await {
        Ok(bytes) => {
            info!("Downloaded {bytes} bytes to {}", dest.display());
            Ok(bytes)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(dest).await
                && rm.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove partial download {}: {rm}", dest.display());
            }
            Err(SetupError::download(url, format!("{e:#}")))
        }
    }
}

async fn stream_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to start download")?;

    if !response.status().is_success() {
        bail!("HTTP {}", response.status());
    }

    let total = response.content_length();

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create download directory")?;
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .context("Failed to create download file")?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk)
            .await
            .context("Error writing to download file")?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.context("Error flushing download file")?;
    file.sync_all().await.context("Error syncing download file")?;

    if let Some(total) = total
        && downloaded != total
    {
        bail!("Truncated download: got {downloaded} of {total} bytes");
    }
    debug!("Download stream for {url} finished");

    Ok(downloaded)
}
