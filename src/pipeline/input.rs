//! Input resolution: a user-supplied path or URL → `.docx` bytes in memory.
//!
//! The whole pipeline works on bytes, so a download never touches the disk.
//! The ZIP magic (`PK\x03\x04`) is checked here so a PDF or a text file
//! fails with [`StylerError::NotADocx`] before any model call is made.

use crate::error::StylerError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// A loaded input document.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub bytes: Vec<u8>,
    /// The path or URL the bytes came from.
    pub source_name: String,
    /// File name without extension, the default book name.
    pub stem: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, StylerError> {
    if input.trim().is_empty() {
        return Err(StylerError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedInput, StylerError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => StylerError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => StylerError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let source_name = path.display().to_string();
    check_magic(&source_name, &bytes)?;
    debug!("Loaded {} ({} bytes)", source_name, bytes.len());

    Ok(LoadedInput {
        bytes,
        stem: file_stem(path),
        source_name,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, StylerError> {
    info!("Downloading document from: {}", url);

    let download_err = |e: reqwest::Error| {
        if e.is_timeout() {
            StylerError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            StylerError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(download_err)?;

    let response = client.get(url).send().await.map_err(download_err)?;

    if !response.status().is_success() {
        return Err(StylerError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(download_err)?.to_vec();
    check_magic(url, &bytes)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedInput {
        bytes,
        source_name: url.to_string(),
        stem: url_stem(url),
    })
}

fn check_magic(source_name: &str, bytes: &[u8]) -> Result<(), StylerError> {
    if bytes.len() >= 4 && bytes[..4] == ZIP_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(StylerError::NotADocx {
        source_name: source_name.to_string(),
        magic,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "documento".to_string())
}

/// Last path segment of a URL, without extension.
fn url_stem(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .map(|last| file_stem(&PathBuf::from(last)))
        .unwrap_or_else(|| "documento".to_string())
}
