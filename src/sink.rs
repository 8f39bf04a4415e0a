//! Persistence collaborator seam.
//!
//! The storefront's catalog persistence is out of scope; this trait is the
//! boundary it plugs into. The NDJSON sink is what the CLI uses to hand the
//! normalized records downstream.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::media::processed::PersistedMediaRecord;

#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Original URLs already persisted for this product, used for
    /// skip-unchanged. Sinks without history return an empty set.
    async fn existing_original_urls(&self, identifier: &str) -> anyhow::Result<HashSet<String>>;

    async fn persist(
        &self,
        identifier: &str,
        records: &[PersistedMediaRecord],
    ) -> anyhow::Result<()>;
}

#[derive(Serialize)]
struct NdjsonLine<'a> {
    identifier: &'a str,
    media: &'a [PersistedMediaRecord],
}

/// Writes one JSON line per product: `{identifier, media: [...]}`.
pub struct NdjsonSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MediaSink for NdjsonSink<W> {
    async fn existing_original_urls(&self, _identifier: &str) -> anyhow::Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn persist(
        &self,
        identifier: &str,
        records: &[PersistedMediaRecord],
    ) -> anyhow::Result<()> {
        let line = serde_json::to_string(&NdjsonLine {
            identifier,
            media: records,
        })?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// In-memory sink recording every persist call; optional known-URL set
    /// for skip-unchanged tests.
    #[derive(Default)]
    pub struct MemorySink {
        pub known_urls: HashSet<String>,
        pub persisted: StdMutex<Vec<(String, Vec<PersistedMediaRecord>)>>,
    }

    #[async_trait]
    impl MediaSink for MemorySink {
        async fn existing_original_urls(
            &self,
            _identifier: &str,
        ) -> anyhow::Result<HashSet<String>> {
            Ok(self.known_urls.clone())
        }

        async fn persist(
            &self,
            identifier: &str,
            records: &[PersistedMediaRecord],
        ) -> anyhow::Result<()> {
            self.persisted
                .lock()
                .unwrap()
                .push((identifier.to_string(), records.to_vec()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::variant;
    use chrono::Utc;

    fn record(url: &str) -> PersistedMediaRecord {
        PersistedMediaRecord {
            url: url.into(),
            alt: "Alt".into(),
            sort_order: 0,
            variants: variant::generate(url, false),
            metadata: crate::media::processed::PersistedMediaMetadata {
                cdn_id: None,
                storage_key: None,
                original_url: url.into(),
                processed_at: Utc::now(),
                fallback: true,
                attribute: "image".into(),
                scope: None,
                locale: None,
            },
        }
    }

    #[tokio::test]
    async fn ndjson_sink_writes_one_line_per_product() {
        let sink = NdjsonSink::new(Vec::new());
        sink.persist("SKU1", &[record("https://src/a.jpg")])
            .await
            .unwrap();
        sink.persist("SKU2", &[]).await.unwrap();
        let buffer = sink.writer.into_inner();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["identifier"], "SKU1");
        assert_eq!(first["media"][0]["url"], "https://src/a.jpg");
    }
}
