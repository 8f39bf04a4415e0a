//! Hosted image-CDN backend: multipart upload, delivery URLs with a
//! transformable trailing variant segment, account-level stats probe.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::CdnConfig;
use crate::media::backend::{BackendUploadResult, UploadBackend, UploadMetadata, SERVICE_CDN};
use crate::media::download::DownloadedAsset;
use crate::media::error::{MediaError, MediaResult};

pub struct CdnImageBackend {
    client: reqwest::Client,
    cfg: CdnConfig,
}

// API envelope; only inspected fields are modeled.
#[derive(Debug, Deserialize)]
struct CdnEnvelope {
    success: bool,
    #[serde(default)]
    errors: Vec<CdnApiError>,
    result: Option<CdnUploadResult>,
}

#[derive(Debug, Deserialize)]
struct CdnApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CdnUploadResult {
    id: String,
    #[serde(default)]
    variants: Vec<String>,
}

impl CdnImageBackend {
    pub fn new(cfg: CdnConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(50))
            .build()?;
        Ok(Self { client, cfg })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/accounts/{}/images/v1",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.account_id
        )
    }

    fn stats_url(&self) -> String {
        format!("{}/stats", self.upload_url())
    }
}

/// Prefer the `public` variant when the account defines one; otherwise take
/// the first delivery URL the service returns.
fn pick_delivery_url(variants: &[String]) -> Option<&String> {
    variants
        .iter()
        .find(|v| v.trim_end_matches('/').ends_with("/public"))
        .or_else(|| variants.first())
}

fn envelope_error(envelope: &CdnEnvelope) -> String {
    envelope
        .errors
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl UploadBackend for CdnImageBackend {
    fn service(&self) -> &'static str {
        SERVICE_CDN
    }

    async fn upload(
        &self,
        asset: &DownloadedAsset,
        metadata: &UploadMetadata,
    ) -> MediaResult<BackendUploadResult> {
        let bytes = tokio::fs::read(&asset.temp_path).await?;
        let part = multipart::Part::bytes(bytes)
            .file_name(asset.filename.clone())
            .mime_str(&asset.content_type)
            .map_err(|e| MediaError::upload(SERVICE_CDN, format!("invalid content type: {e}")))?;
        let form = multipart::Form::new().part("file", part).text(
            "metadata",
            json!({
                "alt": metadata.alt,
                "sku": metadata.sku,
                "attribute": metadata.attribute,
            })
            .to_string(),
        );

        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(&self.cfg.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::upload(SERVICE_CDN, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::upload(
                SERVICE_CDN,
                format!("http {}: {}", status.as_u16(), body),
            ));
        }

        let envelope: CdnEnvelope = response
            .json()
            .await
            .map_err(|e| MediaError::upload(SERVICE_CDN, format!("bad response: {e}")))?;
        if !envelope.success {
            return Err(MediaError::upload(SERVICE_CDN, envelope_error(&envelope)));
        }
        let result = envelope
            .result
            .ok_or_else(|| MediaError::upload(SERVICE_CDN, "response missing result"))?;
        let url = pick_delivery_url(&result.variants)
            .ok_or_else(|| MediaError::upload(SERVICE_CDN, "response missing delivery variants"))?
            .clone();

        debug!(sku = %metadata.sku, image_id = %result.id, url = %url, "cdn upload complete");
        Ok(BackendUploadResult {
            service: SERVICE_CDN,
            id: Some(result.id),
            key: None,
            url,
            variants: result.variants,
            etag: None,
        })
    }

    async fn check_connection(&self) -> MediaResult<()> {
        let response = self
            .client
            .get(self.stats_url())
            .bearer_auth(&self.cfg.api_token)
            .send()
            .await
            .map_err(|e| MediaError::upload(SERVICE_CDN, e.to_string()))?;
        if !response.status().is_success() {
            return Err(MediaError::upload(
                SERVICE_CDN,
                format!("stats check failed: http {}", response.status().as_u16()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_envelope() {
        let raw = r#"{
            "success": true,
            "errors": [],
            "result": {
                "id": "2cdc28f0-017a-49c4-9ed7-87056c83901",
                "variants": [
                    "https://imagedelivery.net/abc123/2cdc28f0-017a-49c4-9ed7-87056c83901/thumbnail",
                    "https://imagedelivery.net/abc123/2cdc28f0-017a-49c4-9ed7-87056c83901/public"
                ]
            }
        }"#;
        let envelope: CdnEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.success);
        let result = envelope.result.unwrap();
        assert_eq!(result.variants.len(), 2);
        assert!(pick_delivery_url(&result.variants).unwrap().ends_with("/public"));
    }

    #[test]
    fn parses_error_envelope() {
        let raw = r#"{"success": false, "errors": [{"code": 5403, "message": "forbidden"}]}"#;
        let envelope: CdnEnvelope = serde_json::from_str(raw).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope_error(&envelope), "forbidden");
    }

    #[test]
    fn falls_back_to_first_variant_without_public() {
        let variants = vec!["https://imagedelivery.net/a/b/hero".to_string()];
        assert_eq!(pick_delivery_url(&variants).unwrap(), &variants[0]);
        assert!(pick_delivery_url(&[]).is_none());
    }

    #[test]
    fn builds_account_scoped_urls() {
        let backend = CdnImageBackend::new(CdnConfig {
            enabled: true,
            account_id: "acct".into(),
            api_token: "tok".into(),
            api_base: "https://api.cloudflare.com/client/v4/".into(),
        })
        .unwrap();
        assert_eq!(
            backend.upload_url(),
            "https://api.cloudflare.com/client/v4/accounts/acct/images/v1"
        );
        assert!(backend.stats_url().ends_with("/images/v1/stats"));
    }
}
