//! Input resolution: turn a user-supplied path or URL into document bytes
//! plus the file name the document will be stored under.
//!
//! Used by the CLI to place an upload at `input/<file>` before splitting.
//! Magic bytes are checked here so a wrong file fails before it reaches the
//! store.

use crate::error::PipelineError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A document read into memory, ready to be uploaded under `input/`.
#[derive(Debug, Clone)]
pub struct InputDocument {
    /// File name, including extension (`acme_minutes.pdf`).
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a document in memory.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputDocument, PipelineError> {
    let doc = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(input, &doc.bytes)?;
    Ok(doc)
}

async fn read_local(path_str: &str) -> Result<InputDocument, PipelineError> {
    let path = PathBuf::from(path_str);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::InvalidInput {
            input: path_str.to_string(),
        })?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| PipelineError::InvalidInput {
            input: path_str.to_string(),
        })?;

    debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
    Ok(InputDocument { file_name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, PipelineError> {
    info!("Downloading document from: {}", url);

    let download_error = |reason: String| PipelineError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_error(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            download_error(format!("timed out after {timeout_secs}s"))
        } else {
            download_error(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_error(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_error(e.to_string()))?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(InputDocument {
        file_name: file_name_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
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

fn check_magic(input: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(PipelineError::InputFormat {
            key: input.to_string(),
            detail: "missing %PDF header".into(),
        });
    }
    Ok(())
}
