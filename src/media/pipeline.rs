//! Per-image pipeline (download → backend uploads → variants) and the
//! chunked batch orchestrator that drives it.
//!
//! Failure isolation is the contract here: one bad image never aborts its
//! chunk or the batch. Every reference terminates in either a finalized
//! descriptor or a fallback descriptor carrying the original URL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::media::alt::{alt_for_nth, resolve_alt_base};
use crate::media::backend::cdn::CdnImageBackend;
use crate::media::backend::storage::ObjectStorageBackend;
use crate::media::backend::{
    select_primary, BackendSet, BackendUploadResult, UploadMetadata, SERVICE_CDN,
    SERVICE_OBJECT_STORAGE,
};
use crate::media::download::{DownloadedAsset, HttpDownloader, ImageFetcher};
use crate::media::error::{MediaError, MediaResult};
use crate::media::priority::prioritize;
use crate::media::processed::{ProcessedImage, ServiceEntry, ServiceMap};
use crate::media::reference::{ImageReference, ReferenceExtractor};
use crate::media::variant;
use crate::product::ProductRecord;

/// Per-call knobs; anything unset falls back to the pipeline config.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub concurrency: Option<usize>,
    pub base_url: Option<String>,
    /// Original URLs the sink already holds; skipped unless reprocessing is
    /// forced (the caller clears this set in that case).
    pub skip_original_urls: HashSet<String>,
}

/// One entry of the batch error report. The image it refers to still exists
/// in the output as a fallback descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSyncError {
    pub url: String,
    pub attribute: String,
    pub message: String,
}

/// Batch result for one product: always returned, even when every image
/// degraded to a fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMediaReport {
    pub identifier: String,
    pub images: Vec<ProcessedImage>,
    /// References discovered before skip filtering.
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<ImageSyncError>,
}

struct WorkItem {
    reference: ImageReference,
    alt: String,
    sort_order: usize,
}

struct ItemOutcome {
    image: ProcessedImage,
    error: Option<String>,
}

pub struct MediaPipeline {
    config: SyncConfig,
    extractor: ReferenceExtractor,
    fetcher: Arc<dyn ImageFetcher>,
    backends: BackendSet,
}

impl MediaPipeline {
    /// Assemble the production pipeline: validates config eagerly, then wires
    /// the HTTP downloader and whichever backends are enabled.
    pub fn from_config(config: SyncConfig) -> MediaResult<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpDownloader::new(&config)?);
        let mut backends = BackendSet::default();
        if config.cdn.enabled {
            backends.cdn = Some(Arc::new(CdnImageBackend::new(config.cdn.clone())?));
        }
        if config.object_storage.enabled {
            backends.object_storage = Some(Arc::new(ObjectStorageBackend::new(
                config.object_storage.clone(),
            )?));
        }
        Ok(Self::new(config, fetcher, backends))
    }

    pub fn new(
        config: SyncConfig,
        fetcher: Arc<dyn ImageFetcher>,
        backends: BackendSet,
    ) -> Self {
        let extractor = ReferenceExtractor::new(&config.image_attributes);
        Self {
            config,
            extractor,
            fetcher,
            backends,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Probe every enabled backend; used by the configuration-test surface.
    pub async fn check_backends(&self) -> Vec<(&'static str, MediaResult<()>)> {
        let mut checks = Vec::new();
        if let Some(cdn) = &self.backends.cdn {
            checks.push((SERVICE_CDN, cdn.check_connection().await));
        }
        if let Some(storage) = &self.backends.object_storage {
            checks.push((SERVICE_OBJECT_STORAGE, storage.check_connection().await));
        }
        checks
    }

    /// Discover, prioritize and process every image of one product.
    ///
    /// The prioritized list is split into consecutive chunks of the
    /// configured concurrency; all items of a chunk settle before the next
    /// chunk starts, with the configured pause in between (none after the
    /// last). The final list is re-sorted by `sort_order`, so completion
    /// timing inside a chunk carries no meaning.
    pub async fn process_product(
        &self,
        product: &ProductRecord,
        options: &ProcessOptions,
    ) -> ProductMediaReport {
        let base_url = options
            .base_url
            .as_deref()
            .or(self.config.base_url.as_deref());
        let mut refs = self.extractor.extract(product, base_url);
        prioritize(&mut refs, &self.config.primary_attributes);
        let total = refs.len();

        let mut skipped = 0usize;
        if !options.skip_original_urls.is_empty() {
            refs.retain(|r| {
                let keep = !options.skip_original_urls.contains(r.url.as_str());
                if !keep {
                    skipped += 1;
                    debug!(sku = %product.identifier, url = %r.url, "image already processed; skipping");
                }
                keep
            });
        }

        let alt_base = resolve_alt_base(product, &self.config.name_attributes);
        let mut per_attribute: HashMap<String, usize> = HashMap::new();
        let items: Vec<WorkItem> = refs
            .into_iter()
            .enumerate()
            .map(|(sort_order, reference)| {
                let nth = per_attribute.entry(reference.attribute.clone()).or_insert(0);
                let alt = alt_for_nth(&alt_base, *nth);
                *nth += 1;
                WorkItem {
                    reference,
                    alt,
                    sort_order,
                }
            })
            .collect();

        let concurrency = options
            .concurrency
            .unwrap_or(self.config.concurrency)
            .max(1);

        let mut images: Vec<ProcessedImage> = Vec::with_capacity(items.len());
        let mut errors: Vec<ImageSyncError> = Vec::new();
        for (chunk_idx, chunk) in items.chunks(concurrency).enumerate() {
            if chunk_idx > 0 && !self.config.chunk_delay.is_zero() {
                sleep(self.config.chunk_delay).await;
            }
            let outcomes = join_all(chunk.iter().map(|item| self.process_one(item))).await;
            for outcome in outcomes {
                if let Some(message) = outcome.error {
                    errors.push(ImageSyncError {
                        url: outcome.image.original_url.clone(),
                        attribute: outcome.image.attribute.clone(),
                        message,
                    });
                }
                images.push(outcome.image);
            }
        }

        // Completion order within a chunk is not meaningful; the contract is
        // prioritizer order.
        images.sort_by_key(|i| i.sort_order);

        info!(
            sku = %product.identifier,
            total,
            processed = images.len(),
            skipped,
            fallbacks = images.iter().filter(|i| i.fallback).count(),
            errors = errors.len(),
            "product media batch complete"
        );

        ProductMediaReport {
            identifier: product.identifier.clone(),
            processed: images.len(),
            images,
            total,
            skipped,
            errors,
        }
    }

    /// Run one image through download → uploads → variants. Infallible by
    /// construction: every failure path degrades to a fallback descriptor.
    async fn process_one(&self, item: &WorkItem) -> ItemOutcome {
        let reference = &item.reference;
        let asset = match self.fetcher.fetch(reference).await {
            Ok(asset) => asset,
            Err(err) => {
                warn!(
                    sku = %reference.metadata.sku,
                    url = %reference.url,
                    error = %err,
                    "download failed; emitting fallback image"
                );
                return self.fallback_outcome(item, ServiceMap::default(), Some(err.to_string()));
            }
        };

        let metadata = UploadMetadata {
            sku: reference.metadata.sku.clone(),
            alt: item.alt.clone(),
            attribute: reference.attribute.clone(),
        };

        // The upload phase gets its own bound so a wedged backend cannot hold
        // the chunk open forever. The download is already bounded internally.
        let attempts = match timeout(
            self.config.image_timeout,
            self.backends.attempt_all(&asset, &metadata),
        )
        .await
        {
            Ok(attempts) => attempts,
            Err(_) => {
                cleanup(&asset).await;
                let err = MediaError::PipelineTimeout(self.config.image_timeout.as_secs());
                return self.fallback_outcome(item, ServiceMap::default(), Some(err.to_string()));
            }
        };

        // Exactly once per downloaded asset, on every remaining path.
        cleanup(&asset).await;

        let services = service_map(&attempts);
        let primary = select_primary(&attempts);
        match primary {
            Some(result) => {
                let cdn_delivery = result.service == SERVICE_CDN;
                let image = self.build_image(
                    item,
                    result.url.clone(),
                    services,
                    cdn_delivery,
                    false,
                );
                ItemOutcome { image, error: None }
            }
            None => {
                // Either both backends failed or none are enabled; only the
                // former is an error worth reporting.
                let error = attempts
                    .iter()
                    .filter_map(|(service, outcome)| {
                        outcome.as_ref().err().map(|e| format!("{service}: {e}"))
                    })
                    .reduce(|a, b| format!("{a}; {b}"));
                self.fallback_outcome(item, services, error)
            }
        }
    }

    fn fallback_outcome(
        &self,
        item: &WorkItem,
        services: ServiceMap,
        error: Option<String>,
    ) -> ItemOutcome {
        let original = item.reference.url.to_string();
        let image = self.build_image(item, original, services, false, true);
        ItemOutcome { image, error }
    }

    fn build_image(
        &self,
        item: &WorkItem,
        primary_url: String,
        services: ServiceMap,
        cdn_delivery: bool,
        fallback: bool,
    ) -> ProcessedImage {
        ProcessedImage {
            original_url: item.reference.url.to_string(),
            variants: variant::generate(&primary_url, cdn_delivery),
            primary_url,
            services,
            alt: item.alt.clone(),
            sort_order: item.sort_order,
            fallback,
            processed_at: chrono::Utc::now(),
            attribute: item.reference.attribute.clone(),
            scope: item.reference.scope.clone(),
            locale: item.reference.locale.clone(),
        }
    }
}

fn service_map(attempts: &[(&'static str, MediaResult<BackendUploadResult>)]) -> ServiceMap {
    let mut map = ServiceMap::default();
    for (service, outcome) in attempts {
        let entry = match outcome {
            Ok(result) => ServiceEntry::success(result),
            Err(err) => ServiceEntry::failure(err.to_string()),
        };
        match *service {
            SERVICE_CDN => map.cdn = Some(entry),
            SERVICE_OBJECT_STORAGE => map.object_storage = Some(entry),
            _ => {}
        }
    }
    map
}

/// Temp cleanup is non-fatal: a file we cannot delete is logged and left to
/// the OS temp reaper.
async fn cleanup(asset: &DownloadedAsset) {
    if let Err(err) = tokio::fs::remove_file(&asset.temp_path).await {
        warn!(
            path = %asset.temp_path.display(),
            error = %err,
            "failed to delete temp file"
        );
    }
}
