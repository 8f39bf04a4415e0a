//! Primary-first ordering of extracted references.

use crate::media::reference::ImageReference;

/// Stable sort: references from a primary attribute come first; within each
/// group the per-attribute index breaks ties. Equal-priority entries keep
/// discovery order.
pub fn prioritize(refs: &mut Vec<ImageReference>, primary_attributes: &[String]) {
    refs.sort_by_key(|r| {
        let group = if primary_attributes.iter().any(|a| a == &r.attribute) {
            0u8
        } else {
            1u8
        };
        (group, r.index)
    });
}
