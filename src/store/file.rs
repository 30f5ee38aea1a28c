//! File-Backed Catalog Store
//!
//! Wraps the in-memory store with a JSON snapshot on disk, written
//! atomically (temp file + rename) after every successful commit. This is
//! what the CLI uses by default when a store path is configured: duplicate
//! offers are then detected across invocations, not just within one
//! process.
//!
//! The file holds the whole catalog; it is a development and small-scale
//! backend, not a replacement for a relational store.

use super::memory::{MemoryData, MemoryStore, MemoryTransaction};
use super::{CatalogStore, StoreError, StoreTransaction};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open (or create) the catalog file.
    pub fn open(path: impl Into<PathBuf>) -> Result<FileStore, StoreError> {
        let path = path.into();
        let inner = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Backend(format!("read {}: {e}", path.display())))?;
            let data: MemoryData = serde_json::from_str(&text)
                .map_err(|e| StoreError::Backend(format!("parse {}: {e}", path.display())))?;
            info!(
                path = %path.display(),
                suppliers = data.suppliers.len(),
                products = data.products.len(),
                "catalog loaded"
            );
            MemoryStore::import(data)
        } else {
            MemoryStore::new()
        };
        Ok(FileStore { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Committed-state accessors, mirroring the in-memory store.
    pub fn suppliers(&self) -> Vec<super::Supplier> {
        self.inner.suppliers()
    }

    pub fn offers(&self) -> Vec<super::Offer> {
        self.inner.offers()
    }

    pub fn products(&self) -> Vec<super::Product> {
        self.inner.products()
    }

    pub fn product_offers(&self) -> Vec<super::ProductOffer> {
        self.inner.product_offers()
    }

    /// Write the snapshot atomically: serialize to a sibling temp file,
    /// then rename over the target.
    fn persist(&self) -> Result<(), StoreError> {
        let data = self.inner.export();
        let text = serde_json::to_string_pretty(&data)
            .map_err(|e| StoreError::Backend(format!("serialize catalog: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("create {}: {e}", parent.display())))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)
            .map_err(|e| StoreError::Backend(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Backend(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

pub struct FileTransaction {
    inner: MemoryTransaction,
    store: FileStore,
}

#[async_trait]
impl CatalogStore for FileStore {
    async fn begin(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let inner = self.inner.begin_memory(cancel)?;
        Ok(Box::new(FileTransaction {
            inner,
            store: self.clone(),
        }))
    }
}

#[async_trait]
impl StoreTransaction for FileTransaction {
    async fn get_or_create_supplier(
        &mut self,
        name: &str,
        description: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<super::Supplier, StoreError> {
        self.inner.get_or_create_supplier(name, description, cancel).await
    }

    async fn offer_exists(
        &mut self,
        supplier_id: i64,
        offer_name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        self.inner.offer_exists(supplier_id, offer_name, cancel).await
    }

    async fn create_offer(
        &mut self,
        offer: super::NewOffer,
        cancel: &CancellationToken,
    ) -> Result<super::Offer, StoreError> {
        self.inner.create_offer(offer, cancel).await
    }

    async fn products_by_eans(
        &mut self,
        eans: &[String],
        cancel: &CancellationToken,
    ) -> Result<std::collections::HashMap<String, super::Product>, StoreError> {
        self.inner.products_by_eans(eans, cancel).await
    }

    async fn bulk_insert_products(
        &mut self,
        products: Vec<super::NewProduct>,
        cancel: &CancellationToken,
    ) -> Result<Vec<super::Product>, StoreError> {
        self.inner.bulk_insert_products(products, cancel).await
    }

    async fn update_products(
        &mut self,
        products: Vec<super::Product>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.inner.update_products(products, cancel).await
    }

    async fn bulk_insert_product_offers(
        &mut self,
        lines: Vec<super::NewProductOffer>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        self.inner.bulk_insert_product_offers(lines, cancel).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let FileTransaction { inner, store } = *self;
        Box::new(inner).commit().await?;
        store.persist()
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let FileTransaction { inner, .. } = *self;
        Box::new(inner).rollback().await
    }
}
