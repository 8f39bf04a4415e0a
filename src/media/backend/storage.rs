//! Bucket object-storage backend: binary POST under a derived key, public
//! URL derivation, bucket-existence probe.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::config::ObjectStorageConfig;
use crate::media::backend::{
    BackendUploadResult, UploadBackend, UploadMetadata, SERVICE_OBJECT_STORAGE,
};
use crate::media::download::DownloadedAsset;
use crate::media::error::{MediaError, MediaResult};

pub struct ObjectStorageBackend {
    client: reqwest::Client,
    cfg: ObjectStorageConfig,
}

impl ObjectStorageBackend {
    pub fn new(cfg: ObjectStorageConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(50))
            .build()?;
        Ok(Self { client, cfg })
    }

    fn endpoint(&self) -> &str {
        self.cfg.endpoint.trim_end_matches('/')
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.endpoint(),
            self.cfg.bucket,
            encode_key(key)
        )
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.endpoint(),
            self.cfg.bucket,
            encode_key(key)
        )
    }

    fn bucket_url(&self) -> String {
        format!("{}/bucket/{}", self.endpoint(), self.cfg.bucket)
    }
}

/// `{sku-path-or-year/month}/{filename}`; collision-free because the
/// filename embeds a random id.
pub fn derive_key(sku: &str, filename: &str) -> String {
    let prefix = sanitize_key_segment(sku);
    if prefix.is_empty() {
        format!("{}/{}", Utc::now().format("%Y/%m"), filename)
    } else {
        format!("{prefix}/{filename}")
    }
}

fn sanitize_key_segment(raw: &str) -> String {
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

/// Percent-encode each key segment, preserving the `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl UploadBackend for ObjectStorageBackend {
    fn service(&self) -> &'static str {
        SERVICE_OBJECT_STORAGE
    }

    async fn upload(
        &self,
        asset: &DownloadedAsset,
        metadata: &UploadMetadata,
    ) -> MediaResult<BackendUploadResult> {
        let key = derive_key(&metadata.sku, &asset.filename);
        let bytes = tokio::fs::read(&asset.temp_path).await?;

        let response = self
            .client
            .post(self.object_url(&key))
            .bearer_auth(&self.cfg.api_key)
            .header(reqwest::header::CONTENT_TYPE, &asset.content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| MediaError::upload(SERVICE_OBJECT_STORAGE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::upload(
                SERVICE_OBJECT_STORAGE,
                format!("http {}: {}", status.as_u16(), body),
            ));
        }
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        let url = self.public_url(&key);
        debug!(sku = %metadata.sku, key = %key, url = %url, "object storage upload complete");
        Ok(BackendUploadResult {
            service: SERVICE_OBJECT_STORAGE,
            id: None,
            key: Some(key),
            url,
            variants: Vec::new(),
            etag,
        })
    }

    async fn check_connection(&self) -> MediaResult<()> {
        let response = self
            .client
            .get(self.bucket_url())
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await
            .map_err(|e| MediaError::upload(SERVICE_OBJECT_STORAGE, e.to_string()))?;
        if !response.status().is_success() {
            return Err(MediaError::upload(
                SERVICE_OBJECT_STORAGE,
                format!(
                    "bucket check failed: http {}",
                    response.status().as_u16()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_sku_prefix() {
        let key = derive_key("SKU-001", "SKU-001_abc.jpg");
        assert_eq!(key, "SKU-001/SKU-001_abc.jpg");
    }

    #[test]
    fn key_falls_back_to_year_month() {
        let key = derive_key("", "image_abc.jpg");
        let parts: Vec<_> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4); // year
        assert_eq!(parts[1].len(), 2); // month
        assert_eq!(parts[2], "image_abc.jpg");
    }

    #[test]
    fn hostile_sku_cannot_escape_prefix() {
        let key = derive_key("../secret", "f.jpg");
        assert!(!key.contains(".."));
        assert_eq!(key, "secret/f.jpg");
    }

    #[test]
    fn urls_are_bucket_scoped() {
        let backend = ObjectStorageBackend::new(ObjectStorageConfig {
            enabled: true,
            endpoint: "https://acct.supabase.co/storage/v1/".into(),
            bucket: "product-media".into(),
            api_key: "key".into(),
        })
        .unwrap();
        assert_eq!(
            backend.object_url("SKU1/a.jpg"),
            "https://acct.supabase.co/storage/v1/object/product-media/SKU1/a.jpg"
        );
        assert_eq!(
            backend.public_url("SKU1/a.jpg"),
            "https://acct.supabase.co/storage/v1/object/public/product-media/SKU1/a.jpg"
        );
        assert!(backend.bucket_url().ends_with("/bucket/product-media"));
    }
}
