//! Alt text resolution from name-like attributes.

use crate::product::ProductRecord;

/// First non-empty value among the configured name-like attributes, falling
/// back to the product identifier.
pub fn resolve_alt_base(product: &ProductRecord, name_attributes: &[String]) -> String {
    name_attributes
        .iter()
        .find_map(|attr| product.first_string_value(attr))
        .unwrap_or(&product.identifier)
        .to_string()
}

/// Alt for the nth image (0-based) contributed by one attribute: the first
/// keeps the bare name, later ones get an index suffix starting at 1.
pub fn alt_for_nth(base: &str, nth: usize) -> String {
    if nth == 0 {
        base.to_string()
    } else {
        format!("{base} - Image {nth}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name_attrs() -> Vec<String> {
        vec!["name".into(), "label".into(), "title".into(), "product_name".into()]
    }

    #[test]
    fn picks_first_non_empty_name_attribute() {
        let p: ProductRecord = serde_json::from_value(json!({
            "identifier": "SKU1",
            "values": {
                "label": [{"data": "Label Wins"}],
                "name": [{"data": ""}]
            }
        }))
        .unwrap();
        assert_eq!(resolve_alt_base(&p, &name_attrs()), "Label Wins");
    }

    #[test]
    fn falls_back_to_identifier() {
        let p: ProductRecord =
            serde_json::from_value(json!({"identifier": "SKU1", "values": {}})).unwrap();
        assert_eq!(resolve_alt_base(&p, &name_attrs()), "SKU1");
    }

    #[test]
    fn suffixes_start_at_one_for_second_image() {
        assert_eq!(alt_for_nth("Blue Mug", 0), "Blue Mug");
        assert_eq!(alt_for_nth("Blue Mug", 1), "Blue Mug - Image 1");
        assert_eq!(alt_for_nth("Blue Mug", 2), "Blue Mug - Image 2");
    }
}
