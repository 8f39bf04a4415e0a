//! Normalized per-image output descriptors handed to the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::backend::BackendUploadResult;
use crate::media::variant::ImageVariants;

/// Outcome of one backend slot: either the upload coordinates or the error
/// that slot produced. Both never coexist.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceEntry {
    pub fn success(result: &BackendUploadResult) -> Self {
        Self {
            id: result.id.clone(),
            key: result.key.clone(),
            url: Some(result.url.clone()),
            etag: result.etag.clone(),
            error: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            error: Some(message),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<ServiceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_storage: Option<ServiceEntry>,
}

/// Durable descriptor for one processed image. Always carries a usable
/// primary URL, worst case the original remote URL with `fallback` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedImage {
    pub original_url: String,
    pub primary_url: String,
    pub services: ServiceMap,
    pub variants: ImageVariants,
    pub alt: String,
    pub sort_order: usize,
    pub fallback: bool,
    pub processed_at: DateTime<Utc>,
    pub attribute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// The shape the persistence collaborator receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMediaRecord {
    pub url: String,
    pub alt: String,
    pub sort_order: usize,
    pub variants: ImageVariants,
    pub metadata: PersistedMediaMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    pub original_url: String,
    pub processed_at: DateTime<Utc>,
    pub fallback: bool,
    pub attribute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl ProcessedImage {
    pub fn to_persistence_record(&self) -> PersistedMediaRecord {
        PersistedMediaRecord {
            url: self.primary_url.clone(),
            alt: self.alt.clone(),
            sort_order: self.sort_order,
            variants: self.variants.clone(),
            metadata: PersistedMediaMetadata {
                cdn_id: self.services.cdn.as_ref().and_then(|s| s.id.clone()),
                storage_key: self
                    .services
                    .object_storage
                    .as_ref()
                    .and_then(|s| s.key.clone()),
                original_url: self.original_url.clone(),
                processed_at: self.processed_at,
                fallback: self.fallback,
                attribute: self.attribute.clone(),
                scope: self.scope.clone(),
                locale: self.locale.clone(),
            },
        }
    }
}
