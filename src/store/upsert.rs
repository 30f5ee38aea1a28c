//! Bulk Upsert Coordinator
//!
//! Merges the normalized rows of one file into the store under a single
//! transaction:
//!
//! 1. resolve the supplier (create on first contact),
//! 2. reject a duplicate `(supplier, offer name)` before any write,
//! 3. create the offer,
//! 4. fetch existing products for all distinct EANs in one round-trip,
//! 5. merge properties into existing products / queue inserts for new ones,
//! 6. batch-insert products and offer lines (in row order),
//! 7. commit, or roll the whole file back.

use crate::error::ProcessingError;
use crate::normalize::NormalizedRow;
use crate::store::{
    CatalogStore, NewOffer, NewProduct, NewProductOffer, Product, StoreError, StoreTransaction,
};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub products_created: usize,
    pub products_updated: usize,
    pub offer_lines_created: usize,
}

/// Compose the canonical offer name for a supplier/file pair.
pub fn offer_name(supplier_name: &str, file_name: &str) -> String {
    format!("{supplier_name} - {file_name}")
}

fn store_error(supplier: &str, offer: &str, e: StoreError) -> ProcessingError {
    match e {
        StoreError::Canceled => ProcessingError::Canceled,
        StoreError::Conflict(message) if message.contains("offer") => {
            ProcessingError::DuplicateOffer {
                supplier: supplier.to_string(),
                offer_name: offer.to_string(),
            }
        }
        other => ProcessingError::Transaction {
            cause: other.to_string(),
        },
    }
}

/// Run the full merge. On any failure the transaction is rolled back and
/// nothing is visible to other runs.
pub async fn run(
    store: &dyn CatalogStore,
    supplier_name: &str,
    supplier_description: Option<&str>,
    file_name: &str,
    currency: &str,
    rows: &[NormalizedRow],
    cancel: &CancellationToken,
) -> Result<UpsertStats, ProcessingError> {
    let offer = offer_name(supplier_name, file_name);
    let mut tx = store
        .begin(cancel)
        .await
        .map_err(|e| store_error(supplier_name, &offer, e))?;

    let merged = merge(
        tx.as_mut(),
        supplier_name,
        supplier_description,
        file_name,
        currency,
        rows,
        cancel,
    )
    .await;
    match merged {
        Ok(stats) => {
            tx.commit()
                .await
                .map_err(|e| store_error(supplier_name, &offer, e))?;
            Ok(stats)
        }
        Err(e) => {
            // Roll back whatever was staged; the original error wins.
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

async fn merge(
    tx: &mut dyn StoreTransaction,
    supplier_name: &str,
    supplier_description: Option<&str>,
    file_name: &str,
    currency: &str,
    rows: &[NormalizedRow],
    cancel: &CancellationToken,
) -> Result<UpsertStats, ProcessingError> {
    let offer_display = offer_name(supplier_name, file_name);
    let map_err = |e: StoreError| store_error(supplier_name, &offer_display, e);

    let supplier = tx
        .get_or_create_supplier(supplier_name, supplier_description, cancel)
        .await
        .map_err(map_err)?;

    let offer_name = offer_name(&supplier.name, file_name);
    if tx
        .offer_exists(supplier.id, &offer_name, cancel)
        .await
        .map_err(map_err)?
    {
        return Err(ProcessingError::DuplicateOffer {
            supplier: supplier.name,
            offer_name,
        });
    }

    let offer = tx
        .create_offer(
            NewOffer {
                supplier_id: supplier.id,
                offer_name: offer_name.clone(),
                currency: currency.to_uppercase(),
                description: None,
            },
            cancel,
        )
        .await
        .map_err(map_err)?;

    // Distinct EANs, preserving first-seen order.
    let mut eans: Vec<String> = Vec::new();
    for row in rows {
        if let Some(ean) = &row.product.ean {
            if !eans.contains(ean) {
                eans.push(ean.clone());
            }
        }
    }

    let mut existing = tx.products_by_eans(&eans, cancel).await.map_err(map_err)?;
    debug!(
        offer = %offer_name,
        rows = rows.len(),
        known_eans = existing.len(),
        "merging normalized rows"
    );

    // Resolution of each row's product: an existing id, or an index into
    // the pending insert list.
    enum Resolution {
        Existing(i64),
        Pending(usize),
    }

    let mut pending: Vec<NewProduct> = Vec::new();
    let mut pending_by_ean: HashMap<String, usize> = HashMap::new();
    let mut resolutions: Vec<Resolution> = Vec::with_capacity(rows.len());
    let mut updated: HashMap<i64, Product> = HashMap::new();

    for row in rows {
        match row.product.ean.as_ref().and_then(|ean| existing.get_mut(ean)) {
            Some(product) => {
                if merge_properties(product, &row.product.dynamic_properties) {
                    updated.insert(product.id, product.clone());
                }
                resolutions.push(Resolution::Existing(product.id));
            }
            None => {
                if let Some(ean) = &row.product.ean {
                    if let Some(&idx) = pending_by_ean.get(ean) {
                        // Same new EAN twice in one file: merge into the
                        // queued insert instead of violating uniqueness.
                        merge_new_properties(&mut pending[idx], &row.product.dynamic_properties);
                        resolutions.push(Resolution::Pending(idx));
                        continue;
                    }
                    pending_by_ean.insert(ean.clone(), pending.len());
                }
                resolutions.push(Resolution::Pending(pending.len()));
                pending.push(NewProduct {
                    ean: row.product.ean.clone(),
                    name: row.product.name.clone(),
                    dynamic_properties: row.product.dynamic_properties.clone(),
                });
            }
        }
    }

    let products_created = pending.len();
    let inserted = tx.bulk_insert_products(pending, cancel).await.map_err(map_err)?;

    let products_updated = updated.len();
    if !updated.is_empty() {
        tx.update_products(updated.into_values().collect(), cancel)
            .await
            .map_err(map_err)?;
    }

    // Offer lines in file row order.
    let lines: Vec<NewProductOffer> = rows
        .iter()
        .zip(resolutions.iter())
        .map(|(row, resolution)| {
            let product_id = match resolution {
                Resolution::Existing(id) => *id,
                Resolution::Pending(idx) => inserted[*idx].id,
            };
            NewProductOffer {
                product_id,
                offer_id: offer.id,
                price: row.line.price,
                quantity: row.line.quantity,
                currency: row.line.currency.clone(),
                description: row.line.description.clone(),
                offer_properties: row.line.offer_properties.clone(),
            }
        })
        .collect();

    let offer_lines_created = tx
        .bulk_insert_product_offers(lines, cancel)
        .await
        .map_err(map_err)? as usize;

    Ok(UpsertStats {
        products_created,
        products_updated,
        offer_lines_created,
    })
}

/// Merge new dynamic properties into an existing product: unknown keys are
/// added, known keys are overwritten only when the current value is empty.
/// Returns whether anything changed.
fn merge_properties(product: &mut Product, incoming: &[(String, String)]) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        match product
            .dynamic_properties
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some((_, current)) => {
                if current.trim().is_empty() && !value.trim().is_empty() {
                    *current = value.clone();
                    changed = true;
                }
            }
            None => {
                product.dynamic_properties.push((key.clone(), value.clone()));
                changed = true;
            }
        }
    }
    changed
}

fn merge_new_properties(product: &mut NewProduct, incoming: &[(String, String)]) {
    for (key, value) in incoming {
        let known = product
            .dynamic_properties
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(key));
        if !known {
            product.dynamic_properties.push((key.clone(), value.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{NormalizedRow, OfferLineDraft, ProductDraft};
    use crate::store::memory::MemoryStore;
    use rust_decimal::Decimal;

    fn row(index: usize, ean: Option<&str>, name: &str, props: &[(&str, &str)]) -> NormalizedRow {
        NormalizedRow {
            row_index: index,
            product: ProductDraft {
                ean: ean.map(str::to_string),
                name: name.to_string(),
                dynamic_properties: props
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            line: OfferLineDraft {
                price: Decimal::new(999, 2),
                quantity: 1,
                currency: "USD".to_string(),
                reference: None,
                description: None,
                offer_properties: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn first_run_creates_everything() {
        let store = MemoryStore::new();
        let rows = vec![
            row(0, Some("111"), "A", &[]),
            row(1, None, "B", &[]),
        ];
        let stats = run(&store, "Acme", None, "f.xlsx", "usd", &rows, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.products_created, 2);
        assert_eq!(stats.offer_lines_created, 2);
        assert_eq!(store.suppliers().len(), 1);
        assert_eq!(store.offers().len(), 1);
        assert_eq!(store.offers()[0].offer_name, "Acme - f.xlsx");
        assert_eq!(store.offers()[0].currency, "USD");
    }

    #[tokio::test]
    async fn duplicate_offer_before_any_write() {
        let store = MemoryStore::new();
        let rows = vec![row(0, Some("111"), "A", &[])];
        let cancel = CancellationToken::new();
        run(&store, "Acme", None, "f.xlsx", "USD", &rows, &cancel).await.unwrap();

        let products_before = store.products().len();
        let err = run(&store, "Acme", None, "f.xlsx", "USD", &rows, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::DuplicateOffer { .. }));
        assert_eq!(store.products().len(), products_before);
        assert_eq!(store.offers().len(), 1);
    }

    #[tokio::test]
    async fn upsert_by_ean_merges_properties() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let first = vec![row(0, Some("111"), "A", &[("Brand", ""), ("Size", "100")])];
        run(&store, "Acme", None, "jan.xlsx", "USD", &first, &cancel).await.unwrap();

        let second = vec![row(0, Some("111"), "A", &[("Brand", "CHANEL"), ("Size", "50"), ("Gender", "Women")])];
        let stats = run(&store, "Acme", None, "feb.xlsx", "USD", &second, &cancel)
            .await
            .unwrap();

        assert_eq!(stats.products_created, 0);
        assert_eq!(stats.products_updated, 1);
        let products = store.products();
        assert_eq!(products.len(), 1);
        let props = &products[0].dynamic_properties;
        // empty value was filled in
        assert!(props.contains(&("Brand".to_string(), "CHANEL".to_string())));
        // non-empty value was preserved
        assert!(props.contains(&("Size".to_string(), "100".to_string())));
        // new key was added
        assert!(props.contains(&("Gender".to_string(), "Women".to_string())));
    }

    #[tokio::test]
    async fn offer_lines_keep_row_order() {
        let store = MemoryStore::new();
        let rows: Vec<NormalizedRow> = (0..20)
            .map(|i| row(i, Some(&format!("ean-{i}")), &format!("P{i}"), &[]))
            .collect();
        run(&store, "Acme", None, "f.xlsx", "USD", &rows, &CancellationToken::new())
            .await
            .unwrap();

        let lines = store.product_offers();
        let products = store.products();
        for window in lines.windows(2) {
            assert!(window[0].id < window[1].id);
        }
        // line i points at product with ean-i
        for (i, line) in lines.iter().enumerate() {
            let product = products.iter().find(|p| p.id == line.product_id).unwrap();
            assert_eq!(product.ean.as_deref(), Some(format!("ean-{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn repeated_new_ean_in_one_file_inserts_once() {
        let store = MemoryStore::new();
        let rows = vec![
            row(0, Some("111"), "A", &[("Brand", "X")]),
            row(1, Some("111"), "A", &[("Size", "50")]),
        ];
        let stats = run(&store, "Acme", None, "f.xlsx", "USD", &rows, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.products_created, 1);
        assert_eq!(stats.offer_lines_created, 2);
        let products = store.products();
        assert_eq!(products.len(), 1);
        assert!(products[0].dynamic_properties.contains(&("Size".to_string(), "50".to_string())));
    }

    #[tokio::test]
    async fn cancellation_rolls_back() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let rows = vec![row(0, Some("111"), "A", &[])];
        let err = run(&store, "Acme", None, "f.xlsx", "USD", &rows, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Canceled));
        assert!(store.suppliers().is_empty());
    }
}
