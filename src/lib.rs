pub mod config;
pub mod media;
pub mod product;
pub mod sink;
pub mod tracing;

pub mod util {
    pub mod env;
}

// Run-level sync: drives the per-product media pipeline across a product
// batch under its own concurrency window and hands results to the sink.
use std::collections::HashSet;
use std::time::Instant;

use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
// Leading `::` disambiguates the tracing crate from the local module.
use ::tracing::{info, warn};

use crate::media::pipeline::{MediaPipeline, ProcessOptions, ProductMediaReport};
use crate::product::ProductRecord;
use crate::sink::MediaSink;

/// Per-call options for a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub concurrency: Option<usize>,
    pub product_concurrency: Option<usize>,
    pub base_url: Option<String>,
    pub force_reprocess: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSyncError {
    pub identifier: String,
    pub message: String,
}

/// Aggregate outcome of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub products: usize,
    pub images: usize,
    pub fallbacks: usize,
    pub skipped: usize,
    pub reports: Vec<ProductMediaReport>,
    /// Per-image degradations plus product-level persistence failures.
    pub errors: Vec<ProductSyncError>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    pub fn log_summary(&self) {
        info!(
            products = self.products,
            images = self.images,
            fallbacks = self.fallbacks,
            skipped = self.skipped,
            errors = self.errors.len(),
            elapsed_ms = self.elapsed_ms,
            "media sync run complete"
        );
    }
}

/// Process `products` through the media pipeline and persist each product's
/// normalized records.
///
/// Per-product and per-image failures degrade into the report; the only hard
/// failures out of this function happen before any batch work starts
/// (configuration is validated when the pipeline is built).
pub async fn sync_products(
    pipeline: &MediaPipeline,
    sink: &dyn MediaSink,
    products: &[ProductRecord],
    options: &SyncOptions,
) -> Result<SyncReport> {
    let started = Instant::now();
    let product_concurrency = options
        .product_concurrency
        .unwrap_or(pipeline.config().product_concurrency)
        .max(1);

    let mut reports: Vec<ProductMediaReport> = Vec::with_capacity(products.len());
    let mut errors: Vec<ProductSyncError> = Vec::new();

    for chunk in products.chunks(product_concurrency) {
        let outcomes = join_all(chunk.iter().map(|product| async {
            let skip_original_urls = if options.force_reprocess {
                HashSet::new()
            } else {
                match sink.existing_original_urls(&product.identifier).await {
                    Ok(urls) => urls,
                    Err(err) => {
                        warn!(
                            sku = %product.identifier,
                            error = %err,
                            "could not read existing media; reprocessing everything"
                        );
                        HashSet::new()
                    }
                }
            };
            let process_options = ProcessOptions {
                concurrency: options.concurrency,
                base_url: options.base_url.clone(),
                skip_original_urls,
            };
            let report = pipeline.process_product(product, &process_options).await;

            let records: Vec<_> = report
                .images
                .iter()
                .map(|image| image.to_persistence_record())
                .collect();
            let persist_error = sink
                .persist(&report.identifier, &records)
                .await
                .err()
                .map(|err| format!("persist failed: {err}"));
            (report, persist_error)
        }))
        .await;

        for (report, persist_error) in outcomes {
            for item in &report.errors {
                errors.push(ProductSyncError {
                    identifier: report.identifier.clone(),
                    message: format!("{} ({}): {}", item.url, item.attribute, item.message),
                });
            }
            if let Some(message) = persist_error {
                warn!(sku = %report.identifier, %message, "sink rejected media records");
                errors.push(ProductSyncError {
                    identifier: report.identifier.clone(),
                    message,
                });
            }
            reports.push(report);
        }
    }

    let report = SyncReport {
        products: reports.len(),
        images: reports.iter().map(|r| r.images.len()).sum(),
        fallbacks: reports
            .iter()
            .flat_map(|r| r.images.iter())
            .filter(|i| i.fallback)
            .count(),
        skipped: reports.iter().map(|r| r.skipped).sum(),
        reports,
        errors,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::media::backend::BackendSet;
    use crate::media::download::test_support::FakeFetcher;
    use crate::sink::test_support::MemorySink;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn product(identifier: &str, url: &str) -> ProductRecord {
        serde_json::from_value(json!({
            "identifier": identifier,
            "values": {"image": [{"data": url}]}
        }))
        .unwrap()
    }

    fn pipeline(dir: &tempfile::TempDir) -> MediaPipeline {
        let mut cfg = SyncConfig::default();
        cfg.temp_dir = dir.path().to_path_buf();
        cfg.chunk_delay = Duration::from_millis(0);
        MediaPipeline::new(
            cfg,
            Arc::new(FakeFetcher::new(dir.path().to_path_buf())),
            BackendSet::default(),
        )
    }

    #[tokio::test]
    async fn run_persists_every_product() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        let products = vec![
            product("SKU1", "https://src/a.jpg"),
            product("SKU2", "https://src/b.png"),
            product("SKU3", "https://src/c.gif"),
        ];
        let report = sync_products(&pipeline(&dir), &sink, &products, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.products, 3);
        assert_eq!(report.images, 3);
        assert_eq!(report.fallbacks, 3); // no backends enabled
        let persisted = sink.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 3);
    }

    #[tokio::test]
    async fn skip_unchanged_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = MemorySink::default();
        sink.known_urls.insert("https://src/a.jpg".into());
        let products = vec![product("SKU1", "https://src/a.jpg")];

        let report = sync_products(&pipeline(&dir), &sink, &products, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.images, 0);

        let forced = SyncOptions {
            force_reprocess: true,
            ..Default::default()
        };
        let report = sync_products(&pipeline(&dir), &sink, &products, &forced)
            .await
            .unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.images, 1);
    }

    #[tokio::test]
    async fn per_image_errors_surface_in_run_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = SyncConfig::default();
        cfg.temp_dir = dir.path().to_path_buf();
        cfg.chunk_delay = Duration::from_millis(0);
        let mut fetcher = FakeFetcher::new(dir.path().to_path_buf());
        fetcher.fail_urls.insert("https://src/b.png".into());
        let pipeline = MediaPipeline::new(cfg, Arc::new(fetcher), BackendSet::default());

        let sink = MemorySink::default();
        let products = vec![
            product("SKU1", "https://src/a.jpg"),
            product("SKU2", "https://src/b.png"),
        ];
        let report = sync_products(&pipeline, &sink, &products, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.products, 2);
        assert_eq!(report.images, 2); // the failure still yields a fallback image
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].identifier, "SKU2");
    }
}
