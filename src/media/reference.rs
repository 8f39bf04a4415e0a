//! Image reference discovery over loosely-typed product attribute data.
//!
//! Two explicit passes: the declared pass walks the configured image
//! attributes (authoritative), the heuristic pass scans every *other*
//! attribute for URL-shaped strings and tags hits as `Discovered` so
//! downstream code can distinguish confidence levels. The passes operate on
//! disjoint attribute sets, so a declared and a discovered reference can
//! never share the same (attribute, index).

use regex::Regex;
use tracing::warn;
use url::Url;

use crate::product::ProductRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Found in a configured image attribute.
    Declared,
    /// Found by the heuristic scan of non-image attributes.
    Discovered,
}

/// Product identity carried alongside each reference for naming and keying.
#[derive(Debug, Clone)]
pub struct RefMetadata {
    pub sku: String,
    pub uuid: Option<String>,
    pub family: Option<String>,
}

/// One image candidate extracted from the attribute map. Ephemeral: consumed
/// by the download stage.
#[derive(Debug, Clone)]
pub struct ImageReference {
    pub url: Url,
    pub attribute: String,
    pub scope: Option<String>,
    pub locale: Option<String>,
    /// Position within the originating attribute's value list.
    pub index: usize,
    pub provenance: Provenance,
    pub metadata: RefMetadata,
}

pub struct ReferenceExtractor {
    image_attributes: Vec<String>,
    extension_pattern: Regex,
}

impl ReferenceExtractor {
    pub fn new(image_attributes: &[String]) -> Self {
        Self {
            image_attributes: image_attributes.to_vec(),
            extension_pattern: Regex::new(r"(?i)\.(jpe?g|png|gif|webp|avif|svg)(\?[^\s]*)?$")
                .expect("static extension pattern"),
        }
    }

    /// Scan `product`'s attribute map and yield ordered image references.
    /// Invalid candidates are dropped with a warning, never raised.
    pub fn extract(&self, product: &ProductRecord, base_url: Option<&str>) -> Vec<ImageReference> {
        let base = base_url.and_then(|raw| match Url::parse(raw) {
            Ok(u) => Some(u),
            Err(err) => {
                warn!(base_url = raw, error = %err, "ignoring unparseable base URL");
                None
            }
        });
        let metadata = RefMetadata {
            sku: product.identifier.clone(),
            uuid: product.uuid.clone(),
            family: product.family.clone(),
        };

        let mut refs: Vec<ImageReference> = Vec::new();

        // Declared pass: configured image attributes, in configuration order.
        for attr in &self.image_attributes {
            let Some(entries) = product.values.get(attr) else {
                continue;
            };
            for (index, value) in entries.iter().enumerate() {
                let Some(candidate) = declared_candidate(&value.data) else {
                    continue;
                };
                match resolve_url(candidate, base.as_ref()) {
                    Some(url) => refs.push(ImageReference {
                        url,
                        attribute: attr.clone(),
                        scope: value.scope.clone(),
                        locale: value.locale.clone(),
                        index,
                        provenance: Provenance::Declared,
                        metadata: metadata.clone(),
                    }),
                    None => warn!(
                        sku = %product.identifier,
                        attribute = %attr,
                        index,
                        candidate,
                        "dropping declared image candidate: not a valid absolute URL"
                    ),
                }
            }
        }

        // Heuristic pass: every attribute not in the declared set. Extension
        // and path-segment matching is best-effort; a coincidental hit (a SKU
        // ending in ".png", say) that also parses as an absolute URL will be
        // carried through as Discovered.
        for (attr, entries) in &product.values {
            if self.image_attributes.iter().any(|a| a == attr) {
                continue;
            }
            for (index, value) in entries.iter().enumerate() {
                let Some(candidate) = value.data.as_str() else {
                    continue;
                };
                if !self.looks_like_image(candidate) {
                    continue;
                }
                match resolve_url(candidate, base.as_ref()) {
                    Some(url) => refs.push(ImageReference {
                        url,
                        attribute: attr.clone(),
                        scope: value.scope.clone(),
                        locale: value.locale.clone(),
                        index,
                        provenance: Provenance::Discovered,
                        metadata: metadata.clone(),
                    }),
                    None => warn!(
                        sku = %product.identifier,
                        attribute = %attr,
                        index,
                        candidate,
                        "dropping discovered image candidate: not a valid absolute URL"
                    ),
                }
            }
        }

        refs
    }

    fn looks_like_image(&self, candidate: &str) -> bool {
        self.extension_pattern.is_match(candidate)
            || candidate.contains("/media/")
            || candidate.contains("/image/")
    }
}

/// Declared attributes may carry a plain URL string or an object exposing
/// url/path/href, depending on the PIM attribute type.
fn declared_candidate(data: &serde_json::Value) -> Option<&str> {
    match data {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        serde_json::Value::Object(map) => ["url", "path", "href"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .filter(|s| !s.trim().is_empty()),
        _ => None,
    }
}

fn resolve_url(raw: &str, base: Option<&Url>) -> Option<Url> {
    match Url::parse(raw.trim()) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Some(u),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.and_then(|b| b.join(raw.trim()).ok())
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> ReferenceExtractor {
        ReferenceExtractor::new(&["image".to_string(), "gallery".to_string()])
    }

    fn product(values: serde_json::Value) -> ProductRecord {
        serde_json::from_value(json!({"identifier": "SKU1", "values": values})).unwrap()
    }

    #[test]
    fn declared_string_and_object_forms() {
        let p = product(json!({
            "image": [
                {"data": "https://src/a.jpg"},
                {"data": {"url": "https://src/b.png"}},
                {"data": {"path": "/media/c.webp"}}
            ]
        }));
        let refs = extractor().extract(&p, Some("https://pim.example"));
        assert_eq!(refs.len(), 3);
        assert!(refs.iter().all(|r| r.provenance == Provenance::Declared));
        assert_eq!(refs[2].url.as_str(), "https://pim.example/media/c.webp");
        assert_eq!(refs[2].index, 2);
    }

    #[test]
    fn heuristic_matches_extension_and_path_segment() {
        let p = product(json!({
            "description": [{"data": "https://cdn.example/shots/promo.jpeg"}],
            "asset_link": [{"data": "https://cdn.example/media/asset?id=9"}],
            "weight": [{"data": 12}]
        }));
        let refs = extractor().extract(&p, None);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.provenance == Provenance::Discovered));
    }

    #[test]
    fn invalid_candidates_are_dropped_not_raised() {
        let p = product(json!({
            "image": [
                {"data": "not a url at all .jpg"},
                {"data": "ftp://files.example/a.png"},
                {"data": "/relative/a.png"}
            ]
        }));
        // No base URL: the relative path cannot resolve either.
        let refs = extractor().extract(&p, None);
        assert!(refs.is_empty());
    }

    #[test]
    fn declared_and_discovered_never_share_attribute_and_index() {
        let p = product(json!({
            "image": [{"data": "https://src/a.jpg"}],
            "spec_sheet": [{"data": "https://src/sheet.png"}]
        }));
        let refs = extractor().extract(&p, None);
        let mut seen = std::collections::HashSet::new();
        for r in &refs {
            assert!(seen.insert((r.attribute.clone(), r.index)));
        }
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn scope_and_locale_carried_through() {
        let p = product(json!({
            "image": [{"data": "https://src/a.jpg", "scope": "ecommerce", "locale": "en_US"}]
        }));
        let refs = extractor().extract(&p, None);
        assert_eq!(refs[0].scope.as_deref(), Some("ecommerce"));
        assert_eq!(refs[0].locale.as_deref(), Some("en_US"));
        assert_eq!(refs[0].metadata.sku, "SKU1");
    }
}
