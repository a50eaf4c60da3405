//! Input resolution: read a user-supplied path or URL into memory.
//!
//! The document is held as bytes for the whole request and handed to the
//! rasteriser directly, so nothing derived from it is ever written to disk.
//! The `%PDF` header is checked up front so callers get a clear error
//! rather than a pdfium failure.

use crate::error::Pdf2PptxError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How far into the file the `%PDF` header may start.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Fail with `MalformedDocument` unless the bytes carry a PDF header.
pub fn ensure_pdf_magic(bytes: &[u8]) -> Result<(), Pdf2PptxError> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW + 4)];
    if window.windows(4).any(|w| w == b"%PDF") {
        Ok(())
    } else {
        Err(Pdf2PptxError::MalformedDocument {
            detail: "missing %PDF header".to_string(),
        })
    }
}

/// Resolve the input string to the document's bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, Pdf2PptxError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(Path::new(input)).await?
    };
    ensure_pdf_magic(&bytes)?;
    Ok(bytes)
}

async fn read_local(path: &Path) -> Result<Vec<u8>, Pdf2PptxError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!(bytes = bytes.len(), "Read local PDF");
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(Pdf2PptxError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(Pdf2PptxError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, Pdf2PptxError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2PptxError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2PptxError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(classify)?;
    info!(bytes = bytes.len(), "Downloaded PDF");
    Ok(bytes.to_vec())
}

/// File stem used to name the rebuilt deck, from a path or the last URL
/// segment. Falls back to `"document"`.
pub fn source_stem(input: &str) -> String {
    let last = if is_url(input) {
        reqwest::Url::parse(input)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .unwrap_or_default()
    } else {
        input.to_string()
    };

    PathBuf::from(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
