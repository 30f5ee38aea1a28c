//! In-Memory Catalog Store
//!
//! A transactional store backed by process memory. Transactions stage
//! their writes privately; reads see committed data overlaid with the
//! transaction's own staged rows. `commit` re-checks the uniqueness
//! invariants against the shared state before publishing, so two
//! concurrent runs cannot both create the same offer.
//!
//! Used by the CLI (dry-run style ingestion) and the test suites.

use super::{
    CatalogStore, NewOffer, NewProduct, NewProductOffer, Offer, Product, ProductOffer,
    StoreError, StoreTransaction, Supplier,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct MemoryData {
    pub(crate) suppliers: Vec<Supplier>,
    pub(crate) offers: Vec<Offer>,
    pub(crate) products: Vec<Product>,
    pub(crate) product_offers: Vec<ProductOffer>,
}

#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            data: Arc::new(Mutex::new(MemoryData::default())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Rebuild a store from previously exported data. The id counter
    /// resumes above the highest id seen.
    pub(crate) fn import(data: MemoryData) -> Self {
        let max_id = data
            .suppliers
            .iter()
            .map(|s| s.id)
            .chain(data.offers.iter().map(|o| o.id))
            .chain(data.products.iter().map(|p| p.id))
            .chain(data.product_offers.iter().map(|l| l.id))
            .max()
            .unwrap_or(0);
        MemoryStore {
            data: Arc::new(Mutex::new(data)),
            next_id: Arc::new(AtomicI64::new(max_id + 1)),
        }
    }

    /// Copy of the committed state, for persistence.
    pub(crate) fn export(&self) -> MemoryData {
        self.data.lock().clone()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Begin a transaction with the concrete type, for stores that wrap
    /// this one.
    pub(crate) fn begin_memory(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MemoryTransaction, StoreError> {
        check(cancel)?;
        let base = self.data.lock().clone();
        Ok(MemoryTransaction {
            store: self.clone(),
            base,
            staged: MemoryData::default(),
            updated_products: Vec::new(),
        })
    }

    // Committed-state accessors, mainly for assertions in tests and for
    // the CLI summary.
    pub fn suppliers(&self) -> Vec<Supplier> {
        self.data.lock().suppliers.clone()
    }

    pub fn offers(&self) -> Vec<Offer> {
        self.data.lock().offers.clone()
    }

    pub fn products(&self) -> Vec<Product> {
        self.data.lock().products.clone()
    }

    pub fn product_offers(&self) -> Vec<ProductOffer> {
        self.data.lock().product_offers.clone()
    }
}

pub struct MemoryTransaction {
    store: MemoryStore,
    /// Committed state as of `begin`; staged reads overlay this.
    base: MemoryData,
    staged: MemoryData,
    updated_products: Vec<Product>,
}

fn check(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Canceled);
    }
    Ok(())
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn begin(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(self.begin_memory(cancel)?))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_or_create_supplier(
        &mut self,
        name: &str,
        description: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Supplier, StoreError> {
        check(cancel)?;
        if let Some(existing) = self
            .base
            .suppliers
            .iter()
            .chain(self.staged.suppliers.iter())
            .find(|s| s.name.eq_ignore_ascii_case(name))
        {
            return Ok(existing.clone());
        }
        let supplier = Supplier {
            id: self.store.allocate_id(),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.staged.suppliers.push(supplier.clone());
        Ok(supplier)
    }

    async fn offer_exists(
        &mut self,
        supplier_id: i64,
        offer_name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        check(cancel)?;
        Ok(self
            .base
            .offers
            .iter()
            .chain(self.staged.offers.iter())
            .any(|o| o.supplier_id == supplier_id && o.offer_name.eq_ignore_ascii_case(offer_name)))
    }

    async fn create_offer(
        &mut self,
        offer: NewOffer,
        cancel: &CancellationToken,
    ) -> Result<Offer, StoreError> {
        if self
            .offer_exists(offer.supplier_id, &offer.offer_name, cancel)
            .await?
        {
            return Err(StoreError::Conflict(format!(
                "offer '{}' already exists",
                offer.offer_name
            )));
        }
        let offer = Offer {
            id: self.store.allocate_id(),
            supplier_id: offer.supplier_id,
            offer_name: offer.offer_name,
            currency: offer.currency,
            description: offer.description,
            created_at: Utc::now(),
        };
        self.staged.offers.push(offer.clone());
        Ok(offer)
    }

    async fn products_by_eans(
        &mut self,
        eans: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Product>, StoreError> {
        check(cancel)?;
        let mut found = HashMap::new();
        for product in self.base.products.iter().chain(self.staged.products.iter()) {
            if let Some(ean) = &product.ean {
                if eans.iter().any(|e| e == ean) {
                    found.insert(ean.clone(), product.clone());
                }
            }
        }
        Ok(found)
    }

    async fn bulk_insert_products(
        &mut self,
        products: Vec<NewProduct>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, StoreError> {
        check(cancel)?;
        let mut inserted = Vec::with_capacity(products.len());
        for product in products {
            if let Some(ean) = &product.ean {
                let duplicate = self
                    .base
                    .products
                    .iter()
                    .chain(self.staged.products.iter())
                    .any(|p| p.ean.as_deref() == Some(ean.as_str()));
                if duplicate {
                    return Err(StoreError::Conflict(format!("EAN '{ean}' already exists")));
                }
            }
            let product = Product {
                id: self.store.allocate_id(),
                ean: product.ean,
                name: product.name,
                dynamic_properties: product.dynamic_properties,
            };
            self.staged.products.push(product.clone());
            inserted.push(product);
        }
        Ok(inserted)
    }

    async fn update_products(
        &mut self,
        products: Vec<Product>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check(cancel)?;
        self.updated_products.extend(products);
        Ok(())
    }

    async fn bulk_insert_product_offers(
        &mut self,
        lines: Vec<NewProductOffer>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        check(cancel)?;
        let count = lines.len() as u64;
        for line in lines {
            let id = self.store.allocate_id();
            self.staged.product_offers.push(ProductOffer {
                id,
                product_id: line.product_id,
                offer_id: line.offer_id,
                price: line.price,
                quantity: line.quantity,
                currency: line.currency,
                description: line.description,
                offer_properties: line.offer_properties,
            });
        }
        Ok(count)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let mut shared = self.store.data.lock();

        // A supplier created concurrently under the same name is the one
        // this run meant: get_or_create is idempotent, so remap instead of
        // failing the whole file.
        for supplier in std::mem::take(&mut self.staged.suppliers) {
            let existing_id = shared
                .suppliers
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(&supplier.name))
                .map(|s| s.id);
            match existing_id {
                Some(existing_id) => {
                    for offer in &mut self.staged.offers {
                        if offer.supplier_id == supplier.id {
                            offer.supplier_id = existing_id;
                        }
                    }
                }
                None => shared.suppliers.push(supplier),
            }
        }

        // Re-check the genuine uniqueness constraints against state
        // committed since `begin`.
        for offer in &self.staged.offers {
            if shared
                .offers
                .iter()
                .any(|o| o.supplier_id == offer.supplier_id
                    && o.offer_name.eq_ignore_ascii_case(&offer.offer_name))
            {
                return Err(StoreError::Conflict(format!(
                    "offer '{}' was created concurrently",
                    offer.offer_name
                )));
            }
        }
        for product in &self.staged.products {
            if let Some(ean) = &product.ean {
                if shared.products.iter().any(|p| p.ean.as_deref() == Some(ean.as_str())) {
                    return Err(StoreError::Conflict(format!(
                        "EAN '{ean}' was inserted concurrently"
                    )));
                }
            }
        }

        shared.offers.extend(self.staged.offers);
        shared.products.extend(self.staged.products);
        for updated in self.updated_products {
            if let Some(slot) = shared.products.iter_mut().find(|p| p.id == updated.id) {
                *slot = updated;
            }
        }
        shared.product_offers.extend(self.staged.product_offers);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged writes are simply dropped.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut tx = store.begin(&cancel).await.unwrap();
        tx.get_or_create_supplier("Acme", None, &cancel).await.unwrap();
        assert!(store.suppliers().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(store.suppliers().len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_staged_rows() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut tx = store.begin(&cancel).await.unwrap();
        let supplier = tx.get_or_create_supplier("Acme", None, &cancel).await.unwrap();
        tx.create_offer(
            NewOffer {
                supplier_id: supplier.id,
                offer_name: "Acme - file.xlsx".to_string(),
                currency: "USD".to_string(),
                description: None,
            },
            &cancel,
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.suppliers().is_empty());
        assert!(store.offers().is_empty());
    }

    #[tokio::test]
    async fn supplier_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut tx = store.begin(&cancel).await.unwrap();
        let first = tx.get_or_create_supplier("Acme", None, &cancel).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(&cancel).await.unwrap();
        let second = tx.get_or_create_supplier("ACME", None, &cancel).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn duplicate_offer_is_a_conflict() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut tx = store.begin(&cancel).await.unwrap();
        let supplier = tx.get_or_create_supplier("Acme", None, &cancel).await.unwrap();
        let offer = NewOffer {
            supplier_id: supplier.id,
            offer_name: "Acme - f.xlsx".to_string(),
            currency: "USD".to_string(),
            description: None,
        };
        tx.create_offer(offer.clone(), &cancel).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(&cancel).await.unwrap();
        assert!(tx.offer_exists(supplier.id, "acme - F.XLSX", &cancel).await.unwrap());
        assert!(matches!(
            tx.create_offer(offer, &cancel).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn products_by_eans_sees_base_and_staged() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut tx = store.begin(&cancel).await.unwrap();
        tx.bulk_insert_products(
            vec![NewProduct {
                ean: Some("111".to_string()),
                name: "Committed".to_string(),
                dynamic_properties: vec![],
            }],
            &cancel,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(&cancel).await.unwrap();
        tx.bulk_insert_products(
            vec![NewProduct {
                ean: Some("222".to_string()),
                name: "Staged".to_string(),
                dynamic_properties: vec![],
            }],
            &cancel,
        )
        .await
        .unwrap();
        let found = tx
            .products_by_eans(&["111".to_string(), "222".to_string()], &cancel)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_offer_commit_conflicts() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut setup = store.begin(&cancel).await.unwrap();
        let supplier = setup.get_or_create_supplier("Acme", None, &cancel).await.unwrap();
        setup.commit().await.unwrap();

        let offer = NewOffer {
            supplier_id: supplier.id,
            offer_name: "Acme - f.xlsx".to_string(),
            currency: "USD".to_string(),
            description: None,
        };

        let mut a = store.begin(&cancel).await.unwrap();
        let mut b = store.begin(&cancel).await.unwrap();
        a.create_offer(offer.clone(), &cancel).await.unwrap();
        b.create_offer(offer, &cancel).await.unwrap();

        a.commit().await.unwrap();
        assert!(matches!(b.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.offers().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let store = MemoryStore::new();
        let cancel = token();
        let mut tx = store.begin(&cancel).await.unwrap();
        cancel.cancel();
        assert!(matches!(
            tx.get_or_create_supplier("Acme", None, &cancel).await,
            Err(StoreError::Canceled)
        ));
    }

    #[tokio::test]
    async fn update_products_merges_at_commit() {
        let store = MemoryStore::new();
        let cancel = token();

        let mut tx = store.begin(&cancel).await.unwrap();
        let inserted = tx
            .bulk_insert_products(
                vec![NewProduct {
                    ean: Some("111".to_string()),
                    name: "P".to_string(),
                    dynamic_properties: vec![("Brand".to_string(), String::new())],
                }],
                &cancel,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(&cancel).await.unwrap();
        let mut product = inserted[0].clone();
        product.dynamic_properties = vec![("Brand".to_string(), "CHANEL".to_string())];
        tx.update_products(vec![product], &cancel).await.unwrap();
        tx.commit().await.unwrap();

        let products = store.products();
        assert_eq!(
            products[0].dynamic_properties,
            vec![("Brand".to_string(), "CHANEL".to_string())]
        );
        assert_eq!(store.products().len(), 1);
    }
}
