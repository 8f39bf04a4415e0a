//! Upload backends: a small fixed strategy set behind one capability.
//!
//! Two compile-time-enumerated implementations (CDN image service, bucket
//! object storage), each independently enabled and attempted inside its own
//! failure boundary. A CDN failure never prevents the object-storage attempt
//! and vice versa.

pub mod cdn;
pub mod storage;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::media::download::DownloadedAsset;
use crate::media::error::{MediaError, MediaResult};

pub const SERVICE_CDN: &str = "cdn";
pub const SERVICE_OBJECT_STORAGE: &str = "object_storage";

/// Context handed to backends alongside the binary.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub sku: String,
    pub alt: String,
    pub attribute: String,
}

/// Successful upload to one backend.
#[derive(Debug, Clone)]
pub struct BackendUploadResult {
    pub service: &'static str,
    /// CDN image id, when the backend assigns one.
    pub id: Option<String>,
    /// Object key, for bucket-style backends.
    pub key: Option<String>,
    pub url: String,
    /// Backend-provided variant URLs (CDN only).
    pub variants: Vec<String>,
    pub etag: Option<String>,
}

#[async_trait]
pub trait UploadBackend: Send + Sync {
    fn service(&self) -> &'static str;

    async fn upload(
        &self,
        asset: &DownloadedAsset,
        metadata: &UploadMetadata,
    ) -> MediaResult<BackendUploadResult>;

    /// Reachability probe used by the configuration-test surface.
    async fn check_connection(&self) -> MediaResult<()>;
}

/// The enabled backend slots for one pipeline instance. Slots hold trait
/// objects so tests can substitute doubles, but the set itself is fixed.
#[derive(Clone, Default)]
pub struct BackendSet {
    pub cdn: Option<Arc<dyn UploadBackend>>,
    pub object_storage: Option<Arc<dyn UploadBackend>>,
}

impl BackendSet {
    pub fn is_empty(&self) -> bool {
        self.cdn.is_none() && self.object_storage.is_none()
    }

    /// Attempt every enabled backend, each isolated: the outcome of one slot
    /// never short-circuits the other.
    pub async fn attempt_all(
        &self,
        asset: &DownloadedAsset,
        metadata: &UploadMetadata,
    ) -> Vec<(&'static str, MediaResult<BackendUploadResult>)> {
        let mut attempts = Vec::new();
        for backend in [self.cdn.as_ref(), self.object_storage.as_ref()]
            .into_iter()
            .flatten()
        {
            let service = backend.service();
            let outcome = backend.upload(asset, metadata).await;
            if let Err(err) = &outcome {
                warn!(
                    service,
                    sku = %metadata.sku,
                    url = %asset.original_url,
                    error = %err,
                    "backend upload failed; continuing with remaining backends"
                );
            }
            attempts.push((service, outcome));
        }
        attempts
    }
}

/// CDN result preferred, then object storage. `None` means every enabled
/// backend failed (or none were enabled) and the caller falls back to the
/// original URL.
pub fn select_primary<'a>(
    attempts: &'a [(&'static str, MediaResult<BackendUploadResult>)],
) -> Option<&'a BackendUploadResult> {
    for wanted in [SERVICE_CDN, SERVICE_OBJECT_STORAGE] {
        if let Some(result) = attempts
            .iter()
            .filter(|(service, _)| *service == wanted)
            .find_map(|(_, outcome)| outcome.as_ref().ok())
        {
            return Some(result);
        }
    }
    None
}
