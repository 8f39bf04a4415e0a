//! Centralized sync configuration: env-driven, validated eagerly at startup.
//!
//! Backend credentials are the one fail-fast case: a backend that is enabled
//! but missing credentials aborts before any batch work starts. Everything
//! else falls back to defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::media::error::MediaError;
use crate::util::env::{env_flag, env_opt, env_parse};

pub const DEFAULT_IMAGE_ATTRIBUTES: &[&str] =
    &["image", "main_image", "product_image", "gallery", "images"];
pub const DEFAULT_PRIMARY_ATTRIBUTES: &[&str] = &["image", "main_image", "product_image"];
pub const DEFAULT_NAME_ATTRIBUTES: &[&str] = &["name", "label", "title", "product_name"];
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/svg+xml",
];

/// CDN image service credentials (account-scoped upload API, bearer auth).
#[derive(Debug, Clone)]
pub struct CdnConfig {
    pub enabled: bool,
    pub account_id: String,
    pub api_token: String,
    pub api_base: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_id: String::new(),
            api_token: String::new(),
            api_base: "https://api.cloudflare.com/client/v4".into(),
        }
    }
}

/// Bucket storage credentials (object POST API, bearer auth).
#[derive(Debug, Clone)]
pub struct ObjectStorageConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket: String,
    pub api_key: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            bucket: String::new(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attribute codes known to carry images (declared pass).
    pub image_attributes: Vec<String>,
    /// Attribute codes whose images sort before all others.
    pub primary_attributes: Vec<String>,
    /// Attribute codes searched (in order) for alt text.
    pub name_attributes: Vec<String>,
    /// Content types accepted by the downloader.
    pub allowed_content_types: Vec<String>,
    /// In-flight per-image pipelines per chunk.
    pub concurrency: usize,
    /// Pause between chunks; no pause after the last one.
    pub chunk_delay: Duration,
    /// Products processed concurrently by the run-level sync.
    pub product_concurrency: usize,
    pub download_timeout: Duration,
    /// Upper bound on the whole per-image pipeline (download + uploads).
    pub image_timeout: Duration,
    pub max_download_bytes: u64,
    pub temp_dir: PathBuf,
    /// Base for resolving relative attribute paths.
    pub base_url: Option<String>,
    pub cdn: CdnConfig,
    pub object_storage: ObjectStorageConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            image_attributes: to_owned_list(DEFAULT_IMAGE_ATTRIBUTES),
            primary_attributes: to_owned_list(DEFAULT_PRIMARY_ATTRIBUTES),
            name_attributes: to_owned_list(DEFAULT_NAME_ATTRIBUTES),
            allowed_content_types: to_owned_list(DEFAULT_ALLOWED_CONTENT_TYPES),
            concurrency: 3,
            chunk_delay: Duration::from_millis(500),
            product_concurrency: 2,
            download_timeout: Duration::from_secs(30),
            image_timeout: Duration::from_secs(120),
            max_download_bytes: 10 * 1024 * 1024,
            temp_dir: std::env::temp_dir(),
            base_url: None,
            cdn: CdnConfig::default(),
            object_storage: ObjectStorageConfig::default(),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env_opt(key) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => to_owned_list(default),
    }
}

impl SyncConfig {
    /// Assemble from environment, applying defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image_attributes: env_list("SYNC_IMAGE_ATTRIBUTES", DEFAULT_IMAGE_ATTRIBUTES),
            primary_attributes: env_list("SYNC_PRIMARY_ATTRIBUTES", DEFAULT_PRIMARY_ATTRIBUTES),
            name_attributes: env_list("SYNC_NAME_ATTRIBUTES", DEFAULT_NAME_ATTRIBUTES),
            allowed_content_types: env_list(
                "MEDIA_ALLOWED_CONTENT_TYPES",
                DEFAULT_ALLOWED_CONTENT_TYPES,
            ),
            concurrency: env_parse("MEDIA_CONCURRENCY", defaults.concurrency),
            chunk_delay: Duration::from_millis(env_parse("MEDIA_CHUNK_DELAY_MS", 500u64)),
            product_concurrency: env_parse(
                "SYNC_PRODUCT_CONCURRENCY",
                defaults.product_concurrency,
            ),
            download_timeout: Duration::from_secs(env_parse("MEDIA_DOWNLOAD_TIMEOUT_SECS", 30u64)),
            image_timeout: Duration::from_secs(env_parse("MEDIA_IMAGE_TIMEOUT_SECS", 120u64)),
            max_download_bytes: env_parse("MEDIA_MAX_DOWNLOAD_BYTES", defaults.max_download_bytes),
            temp_dir: env_opt("MEDIA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            base_url: env_opt("SYNC_BASE_URL"),
            cdn: CdnConfig {
                enabled: env_flag("MEDIA_CDN_ENABLED", false),
                account_id: env_opt("MEDIA_CDN_ACCOUNT_ID").unwrap_or_default(),
                api_token: env_opt("MEDIA_CDN_API_TOKEN").unwrap_or_default(),
                api_base: env_opt("MEDIA_CDN_API_BASE").unwrap_or(defaults.cdn.api_base),
            },
            object_storage: ObjectStorageConfig {
                enabled: env_flag("MEDIA_STORAGE_ENABLED", false),
                endpoint: env_opt("MEDIA_STORAGE_ENDPOINT").unwrap_or_default(),
                bucket: env_opt("MEDIA_STORAGE_BUCKET").unwrap_or_default(),
                api_key: env_opt("MEDIA_STORAGE_API_KEY").unwrap_or_default(),
            },
        }
    }

    /// Fail fast on credentials missing for an enabled backend.
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.cdn.enabled {
            if self.cdn.account_id.trim().is_empty() {
                return Err(MediaError::config(
                    "CDN backend enabled but MEDIA_CDN_ACCOUNT_ID is missing",
                ));
            }
            if self.cdn.api_token.trim().is_empty() {
                return Err(MediaError::config(
                    "CDN backend enabled but MEDIA_CDN_API_TOKEN is missing",
                ));
            }
        }
        if self.object_storage.enabled {
            if self.object_storage.endpoint.trim().is_empty() {
                return Err(MediaError::config(
                    "object storage enabled but MEDIA_STORAGE_ENDPOINT is missing",
                ));
            }
            if self.object_storage.bucket.trim().is_empty() {
                return Err(MediaError::config(
                    "object storage enabled but MEDIA_STORAGE_BUCKET is missing",
                ));
            }
            if self.object_storage.api_key.trim().is_empty() {
                return Err(MediaError::config(
                    "object storage enabled but MEDIA_STORAGE_API_KEY is missing",
                ));
            }
        }
        if self.concurrency == 0 {
            return Err(MediaError::config("MEDIA_CONCURRENCY must be at least 1"));
        }
        if self.product_concurrency == 0 {
            return Err(MediaError::config(
                "SYNC_PRODUCT_CONCURRENCY must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn is_primary_attribute(&self, attribute: &str) -> bool {
        self.primary_attributes.iter().any(|a| a == attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let cfg = SyncConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.chunk_delay, Duration::from_millis(500));
    }

    #[test]
    fn enabled_cdn_without_token_fails() {
        let mut cfg = SyncConfig::default();
        cfg.cdn.enabled = true;
        cfg.cdn.account_id = "acct".into();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, MediaError::Config(_)));
    }

    #[test]
    fn enabled_storage_without_bucket_fails() {
        let mut cfg = SyncConfig::default();
        cfg.object_storage.enabled = true;
        cfg.object_storage.endpoint = "https://store.example/storage/v1".into();
        cfg.object_storage.api_key = "key".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_backends_need_no_credentials() {
        let cfg = SyncConfig::default();
        assert!(!cfg.cdn.enabled);
        assert!(!cfg.object_storage.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn primary_attribute_lookup() {
        let cfg = SyncConfig::default();
        assert!(cfg.is_primary_attribute("main_image"));
        assert!(!cfg.is_primary_attribute("gallery"));
    }
}
