//! Display-size variants derived from the primary URL.
//!
//! No local transcoding happens here: a variant is a URL-level redirection to
//! the CDN's transformation capability. When the primary URL is not a CDN
//! delivery URL (CDN disabled, failed, or no transformable path), every
//! variant equals the primary URL verbatim.

use serde::{Deserialize, Serialize};
use url::Url;

pub const THUMBNAIL_PX: u32 = 150;
pub const MEDIUM_PX: u32 = 600;
pub const LARGE_PX: u32 = 1200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariants {
    pub thumbnail: String,
    pub medium: String,
    pub large: String,
    pub original: String,
}

/// Swap the trailing serving-path segment for a resize directive.
/// Returns None when the URL has no variant segment to substitute.
fn transform(url: &str, width: u32, height: u32) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment_count = parsed
        .path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).count())
        .unwrap_or(0);
    if segment_count < 2 {
        return None;
    }
    let mut out = parsed;
    out.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .pop()
        .push(&format!("w={width},h={height},fit=cover"));
    Some(out.to_string())
}

/// Pure function of its input: re-invoking with the same primary URL yields
/// identical variant URLs.
pub fn generate(primary_url: &str, cdn_delivery: bool) -> ImageVariants {
    let make = |w: u32, h: u32| {
        if cdn_delivery {
            transform(primary_url, w, h).unwrap_or_else(|| primary_url.to_string())
        } else {
            primary_url.to_string()
        }
    };
    ImageVariants {
        thumbnail: make(THUMBNAIL_PX, THUMBNAIL_PX),
        medium: make(MEDIUM_PX, MEDIUM_PX),
        large: make(LARGE_PX, LARGE_PX),
        original: primary_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDN_URL: &str = "https://imagedelivery.net/abc123/2cdc28f0/public";

    #[test]
    fn substitutes_resize_directive_into_serving_segment() {
        let v = generate(CDN_URL, true);
        assert_eq!(
            v.thumbnail,
            "https://imagedelivery.net/abc123/2cdc28f0/w=150,h=150,fit=cover"
        );
        assert_eq!(
            v.medium,
            "https://imagedelivery.net/abc123/2cdc28f0/w=600,h=600,fit=cover"
        );
        assert_eq!(
            v.large,
            "https://imagedelivery.net/abc123/2cdc28f0/w=1200,h=1200,fit=cover"
        );
        assert_eq!(v.original, CDN_URL);
    }

    #[test]
    fn no_op_path_returns_primary_verbatim() {
        let primary = "https://src/a.jpg";
        let v = generate(primary, false);
        assert_eq!(v.thumbnail, primary);
        assert_eq!(v.medium, primary);
        assert_eq!(v.large, primary);
        assert_eq!(v.original, primary);
    }

    #[test]
    fn untransformable_cdn_url_degrades_to_primary() {
        // Single path segment: nothing to substitute.
        let primary = "https://cdn.example/only";
        let v = generate(primary, true);
        assert_eq!(v.thumbnail, primary);
    }

    #[test]
    fn generation_is_idempotent() {
        let first = generate(CDN_URL, true);
        let second = generate(CDN_URL, true);
        assert_eq!(first, second);

        let first = generate("https://src/a.jpg", false);
        let second = generate("https://src/a.jpg", false);
        assert_eq!(first, second);
    }
}
