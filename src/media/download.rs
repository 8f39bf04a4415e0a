//! Streaming image downloader: remote URL → uniquely named local temp file.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::media::error::{MediaError, MediaResult};
use crate::media::reference::ImageReference;

/// A downloaded image on local disk, exclusively owned by the per-image
/// pipeline invocation until cleanup.
#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    pub temp_path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub original_url: Url,
}

/// Seam between the orchestrator and the network. The production impl streams
/// over HTTP; tests substitute a local fake.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &ImageReference) -> MediaResult<DownloadedAsset>;
}

pub struct HttpDownloader {
    client: reqwest::Client,
    temp_dir: PathBuf,
    timeout: Duration,
    max_bytes: u64,
    allowed_content_types: Vec<String>,
}

impl HttpDownloader {
    pub fn new(config: &SyncConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(50))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            temp_dir: config.temp_dir.clone(),
            timeout: config.download_timeout,
            max_bytes: config.max_download_bytes,
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpDownloader {
    async fn fetch(&self, reference: &ImageReference) -> MediaResult<DownloadedAsset> {
        let url = reference.url.clone();
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify_net_error(e))?;

        if !response.status().is_success() {
            return Err(MediaError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = match response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            Some(raw) => normalize_content_type(raw),
            None => return Err(MediaError::MissingContentType),
        };
        if !self.allowed_content_types.contains(&content_type) {
            return Err(MediaError::DisallowedContentType(content_type));
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(MediaError::Oversized {
                    size: declared,
                    limit: self.max_bytes,
                });
            }
        }

        let filename = temp_filename(&reference.metadata.sku, &content_type);
        let temp_path = self.temp_dir.join(&filename);
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut stream = response.bytes_stream();
        let mut size: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    discard_partial(&temp_path).await;
                    return Err(self.classify_net_error(e));
                }
            };
            size += chunk.len() as u64;
            if size > self.max_bytes {
                discard_partial(&temp_path).await;
                return Err(MediaError::Oversized {
                    size,
                    limit: self.max_bytes,
                });
            }
            if let Err(e) = file.write_all(&chunk).await {
                discard_partial(&temp_path).await;
                return Err(e.into());
            }
        }
        if let Err(e) = file.flush().await {
            discard_partial(&temp_path).await;
            return Err(e.into());
        }

        debug!(url = %url, size, path = %temp_path.display(), "image downloaded");
        Ok(DownloadedAsset {
            temp_path,
            filename,
            content_type,
            size,
            original_url: url,
        })
    }
}

impl HttpDownloader {
    fn classify_net_error(&self, err: reqwest::Error) -> MediaError {
        if err.is_timeout() {
            MediaError::DownloadTimeout(self.timeout.as_secs())
        } else {
            MediaError::Net(err)
        }
    }
}

/// Partial files from a failed stream must not outlive the call; the pipeline
/// never learns their path.
async fn discard_partial(path: &std::path::Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %err, "failed to remove partial download");
    }
}

/// Strip parameters (`; charset=...`) and lowercase.
fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or(raw)
        .trim()
        .to_ascii_lowercase()
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        _ => "img",
    }
}

/// `{sku-or-"image"}_{random-id}.{ext-from-mime}`; the random id is the only
/// mechanism preventing collisions in the shared temp directory.
pub fn temp_filename(sku: &str, content_type: &str) -> String {
    let stem = sanitize_component(sku);
    let stem = if stem.is_empty() { "image" } else { &stem };
    format!(
        "{}_{}.{}",
        stem,
        Uuid::new_v4().simple(),
        extension_for(content_type)
    )
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
