//! Row Normalizer
//!
//! Projects a fully parsed property bag into the normalized
//! product + offer-line pair the upsert coordinator consumes. Reserved
//! keys (`Product.EAN`, `Product.Name`, `Offer.Price`, `Offer.Quantity`,
//! `Offer.Currency`, `Offer.Ref`, `Offer.Description`) map to typed
//! fields; every other `Product.*` / `Offer.*` key lands in the dynamic
//! property maps, in insertion order of first assignment.
//!
//! Engine-internal bag keys (`.Clean` siblings, `K[i]`, `K.Length`) never
//! leave the bag.

use crate::engine::text;
use crate::engine::ParsedRow;
use crate::error::Warning;
use crate::formats::CompiledSupplier;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

/// Maximum stored product name length.
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub ean: Option<String>,
    pub name: String,
    pub dynamic_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferLineDraft {
    pub price: Decimal,
    pub quantity: i32,
    pub currency: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub offer_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    pub row_index: usize,
    pub product: ProductDraft,
    pub line: OfferLineDraft,
}

const RESERVED_PRODUCT: [&str; 2] = ["ean", "name"];
const RESERVED_OFFER: [&str; 5] = ["price", "quantity", "currency", "ref", "description"];

/// Keys the engine writes for its own bookkeeping.
fn is_internal_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower.ends_with(".clean") || lower.ends_with(".length") || lower.contains('[')
}

pub struct RowNormalizer<'a> {
    supplier: &'a CompiledSupplier,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(supplier: &'a CompiledSupplier) -> Self {
        RowNormalizer { supplier }
    }

    /// Project one parsed row. `Err` is the dropped-row warning.
    pub fn normalize(&self, parsed: &ParsedRow) -> Result<NormalizedRow, Warning> {
        let bag = &parsed.bag;
        let row = parsed.row_index;

        if !bag.has_key_with_prefix("Product.") {
            return Err(Warning::RowDropped {
                row,
                reason: "no product fields extracted".to_string(),
            });
        }

        let name = bag
            .get("Product.Name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Warning::RowDropped {
                row,
                reason: "product name is missing".to_string(),
            })?;
        let name: String = name.chars().take(MAX_NAME_LEN).collect();

        let ean = bag
            .get("Product.EAN")
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        let price = match bag.get("Offer.Price").map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => match Decimal::from_str(&text::normalize_number(raw)) {
                Ok(price) => price.round_dp(2),
                Err(_) => {
                    warn!(row, value = raw, "unparseable price, defaulting to 0");
                    Decimal::ZERO
                }
            },
            None => Decimal::ZERO,
        };

        let quantity = match bag.get("Offer.Quantity").map(str::trim).filter(|q| !q.is_empty()) {
            Some(raw) => match text::parse_number(raw) {
                Some(value) => value as i32,
                None => {
                    warn!(row, value = raw, "unparseable quantity, defaulting to 0");
                    0
                }
            },
            None => 0,
        };

        let currency = match bag.get("Offer.Currency").map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => {
                let upper = raw.to_uppercase();
                if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
                    upper
                } else {
                    warn!(row, value = raw, "invalid currency, using supplier default");
                    self.supplier.currency.clone()
                }
            }
            None => self.supplier.currency.clone(),
        };

        let mut dynamic_properties = Vec::new();
        let mut offer_properties = Vec::new();
        for (key, value) in bag.iter() {
            if is_internal_key(key) {
                continue;
            }
            let lower = key.to_lowercase();
            if let Some(prop) = lower.strip_prefix("product.") {
                if !RESERVED_PRODUCT.contains(&prop) {
                    dynamic_properties.push((key["Product.".len()..].to_string(), value.to_string()));
                }
            } else if let Some(prop) = lower.strip_prefix("offer.") {
                if !RESERVED_OFFER.contains(&prop) {
                    offer_properties.push((key["Offer.".len()..].to_string(), value.to_string()));
                }
            }
        }

        Ok(NormalizedRow {
            row_index: row,
            product: ProductDraft {
                ean,
                name,
                dynamic_properties,
            },
            line: OfferLineDraft {
                price,
                quantity,
                currency,
                reference: bag.get("Offer.Ref").map(str::to_string),
                description: bag.get("Offer.Description").map(str::to_string),
                offer_properties,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bag::PropertyBag;
    use crate::formats::compile_supplier;
    use crate::formats::lookup::LookupSet;
    use crate::formats::model::SupplierDoc;

    fn supplier() -> CompiledSupplier {
        let doc: SupplierDoc =
            serde_json::from_str(r#"{ "Name": "S", "Currency": "usd" }"#).unwrap();
        compile_supplier(&doc, &LookupSet::new()).unwrap()
    }

    fn parsed(pairs: &[(&str, &str)]) -> ParsedRow {
        let mut bag = PropertyBag::new();
        for (k, v) in pairs {
            bag.set(k, *v);
        }
        ParsedRow {
            row_index: 5,
            bag,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn full_projection() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let row = normalizer
            .normalize(&parsed(&[
                ("Text", "raw"),
                ("Product.EAN", " 4011700301009 "),
                ("Product.Name", "Devotion Intense"),
                ("Product.Brand", "Dolce & Gabbana"),
                ("Product.Brand.Clean", "leftover"),
                ("Product.Size", "100"),
                ("Offer.Price", "89,90"),
                ("Offer.Quantity", "12"),
                ("Offer.Ref", "REF-1"),
                ("Offer.Description", "desc"),
                ("Offer.Lot", "B7"),
            ]))
            .unwrap();

        assert_eq!(row.product.ean.as_deref(), Some("4011700301009"));
        assert_eq!(row.product.name, "Devotion Intense");
        assert_eq!(
            row.product.dynamic_properties,
            vec![
                ("Brand".to_string(), "Dolce & Gabbana".to_string()),
                ("Size".to_string(), "100".to_string())
            ]
        );
        assert_eq!(row.line.price, Decimal::new(8990, 2));
        assert_eq!(row.line.quantity, 12);
        assert_eq!(row.line.currency, "USD");
        assert_eq!(row.line.reference.as_deref(), Some("REF-1"));
        assert_eq!(
            row.line.offer_properties,
            vec![("Lot".to_string(), "B7".to_string())]
        );
    }

    #[test]
    fn missing_name_drops_the_row() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let err = normalizer
            .normalize(&parsed(&[("Product.Brand", "CHANEL")]))
            .unwrap_err();
        assert!(matches!(err, Warning::RowDropped { row: 5, .. }));
    }

    #[test]
    fn no_product_keys_drops_the_row() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let err = normalizer
            .normalize(&parsed(&[("Offer.Price", "1.00")]))
            .unwrap_err();
        assert!(matches!(err, Warning::RowDropped { .. }));
    }

    #[test]
    fn blank_ean_becomes_null() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let row = normalizer
            .normalize(&parsed(&[("Product.Name", "N"), ("Product.EAN", "  ")]))
            .unwrap();
        assert_eq!(row.product.ean, None);
    }

    #[test]
    fn currency_falls_back_to_supplier() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let row = normalizer
            .normalize(&parsed(&[("Product.Name", "N"), ("Offer.Currency", "eur")]))
            .unwrap();
        assert_eq!(row.line.currency, "EUR");

        let row = normalizer
            .normalize(&parsed(&[("Product.Name", "N"), ("Offer.Currency", "euros")]))
            .unwrap();
        assert_eq!(row.line.currency, "USD");

        let row = normalizer.normalize(&parsed(&[("Product.Name", "N")])).unwrap();
        assert_eq!(row.line.currency, "USD");
    }

    #[test]
    fn unparseable_price_defaults_to_zero() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let row = normalizer
            .normalize(&parsed(&[("Product.Name", "N"), ("Offer.Price", "call us")]))
            .unwrap();
        assert_eq!(row.line.price, Decimal::ZERO);
    }

    #[test]
    fn price_rounds_to_two_decimals() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let row = normalizer
            .normalize(&parsed(&[("Product.Name", "N"), ("Offer.Price", "10.999")]))
            .unwrap();
        assert_eq!(row.line.price, Decimal::new(1100, 2));
    }

    #[test]
    fn array_and_clean_keys_never_leak() {
        let supplier = supplier();
        let normalizer = RowNormalizer::new(&supplier);
        let row = normalizer
            .normalize(&parsed(&[
                ("Product.Name", "N"),
                ("Product.Parts[0]", "a"),
                ("Product.Parts.Length", "1"),
                ("Product.Name.Clean", "x"),
            ]))
            .unwrap();
        assert!(row.product.dynamic_properties.is_empty());
    }
}
