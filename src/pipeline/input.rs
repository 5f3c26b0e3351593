//! Input resolution for the CLI: a local path or an HTTP(S) URL becomes the
//! uploaded bytes plus the filename to record.
//!
//! The library API takes bytes; this module is the only place that touches
//! the outside world to obtain them. Reads are bounded by the upload ceiling
//! so an oversized file or an endless response body is refused without
//! being held in memory. Content checks (`%PDF` magic, page count) are left
//! to the extractor so the CLI reports them exactly like any other caller.

use crate::error::InputError;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Bytes and display name of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedInput {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL, refusing anything over `max_bytes`.
pub async fn load_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<LoadedInput, InputError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        read_local(input, max_bytes).await
    }
}

fn limit_mb(max_bytes: u64) -> u64 {
    max_bytes / (1024 * 1024)
}

async fn read_local(path_str: &str, max_bytes: u64) -> Result<LoadedInput, InputError> {
    let path = PathBuf::from(path_str);
    let map_io = |e: std::io::Error, path: PathBuf| match e.kind() {
        std::io::ErrorKind::NotFound => InputError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => InputError::PermissionDenied { path },
        _ => InputError::Io { path, source: e },
    };

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| map_io(e, path.clone()))?;
    if !meta.is_file() {
        return Err(InputError::FileNotFound { path });
    }
    if meta.len() > max_bytes {
        return Err(InputError::TooLarge {
            input: path.display().to_string(),
            limit_mb: limit_mb(max_bytes),
        });
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| map_io(e, path.clone()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string());

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(LoadedInput { bytes, filename })
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<LoadedInput, InputError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| InputError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let from_reqwest = |e: reqwest::Error| {
        if e.is_timeout() {
            InputError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };
    let too_large = || InputError::TooLarge {
        input: url.to_string(),
        limit_mb: limit_mb(max_bytes),
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(from_reqwest)?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    if response.content_length().is_some_and(|len| len > max_bytes) {
        return Err(too_large());
    }

    let filename = extract_filename(url);

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(from_reqwest)?;
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes as {}", bytes.len(), filename);
    Ok(LoadedInput { bytes, filename })
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
