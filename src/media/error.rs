use thiserror::Error;

/// Typed failure taxonomy for the media pipeline.
///
/// Only `Config` is fail-fast: it is raised before any batch work starts.
/// Everything else is caught at a per-image or per-backend boundary and
/// degraded into the normal output shape.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("download timed out after {0}s")]
    DownloadTimeout(u64),
    #[error("response exceeds max size ({size} > {limit} bytes)")]
    Oversized { size: u64, limit: u64 },
    #[error("disallowed content type: {0}")]
    DisallowedContentType(String),
    #[error("missing content type header")]
    MissingContentType,
    #[error("http {status}: {url}")]
    HttpStatus { status: u16, url: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload to {service} failed: {message}")]
    Upload { service: &'static str, message: String },
    #[error("pipeline timed out after {0}s")]
    PipelineTimeout(u64),
    #[error("config: {0}")]
    Config(String),
}

impl MediaError {
    /// Missing credentials or other startup misconfiguration.
    pub fn config(msg: impl Into<String>) -> Self {
        MediaError::Config(msg.into())
    }

    pub fn upload(service: &'static str, message: impl Into<String>) -> Self {
        MediaError::Upload {
            service,
            message: message.into(),
        }
    }
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;
