//! Catalog Store
//!
//! The abstract persistence contract the upsert coordinator runs against,
//! plus the stored entity types. Every operation is parameterized,
//! transactional and cancellable; a transaction belongs to exactly one file
//! processing run and is never shared.
//!
//! The crate ships two implementations: an in-memory store
//! ([`memory::MemoryStore`]) for tests and one-shot runs, and a JSON-file
//! backed store ([`file::FileStore`]) that gives the CLI durable duplicate
//! detection across invocations. A relational backend implements the same
//! traits out of tree.

pub mod file;
pub mod memory;
pub mod upsert;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub supplier_id: i64,
    pub offer_name: String,
    /// Three uppercase letters
    pub currency: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    /// Unique when present and non-empty
    pub ean: Option<String>,
    pub name: String,
    /// Arbitrary keys, insertion-ordered
    pub dynamic_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOffer {
    pub id: i64,
    pub product_id: i64,
    pub offer_id: i64,
    pub price: Decimal,
    pub quantity: i32,
    pub currency: String,
    pub description: Option<String>,
    pub offer_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub supplier_id: i64,
    pub offer_name: String,
    pub currency: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub ean: Option<String>,
    pub name: String,
    pub dynamic_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct NewProductOffer {
    pub product_id: i64,
    pub offer_id: i64,
    pub price: Decimal,
    pub quantity: i32,
    pub currency: String,
    pub description: Option<String>,
    pub offer_properties: Vec<(String, String)>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Uniqueness violation (offer name, supplier name, EAN)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached or the statement failed
    #[error("store error: {0}")]
    Backend(String),

    /// The operation observed a cancellation request
    #[error("store operation canceled")]
    Canceled,
}

/// Entry point: one transaction per file processing run.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// The operations the upsert coordinator needs, all inside one transaction.
/// Writes become visible to other runs only at `commit`.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Resolve a supplier by case-insensitive name, creating it if absent.
    async fn get_or_create_supplier(
        &mut self,
        name: &str,
        description: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Supplier, StoreError>;

    async fn offer_exists(
        &mut self,
        supplier_id: i64,
        offer_name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError>;

    async fn create_offer(
        &mut self,
        offer: NewOffer,
        cancel: &CancellationToken,
    ) -> Result<Offer, StoreError>;

    /// Fetch existing products for a set of EANs in one round-trip.
    async fn products_by_eans(
        &mut self,
        eans: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Product>, StoreError>;

    /// Insert in order; the returned products carry their assigned ids and
    /// are in input order.
    async fn bulk_insert_products(
        &mut self,
        products: Vec<NewProduct>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, StoreError>;

    /// Persist merged dynamic properties of existing products.
    async fn update_products(
        &mut self,
        products: Vec<Product>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// Insert in order; insertion order is the row order of the file.
    async fn bulk_insert_product_offers(
        &mut self,
        lines: Vec<NewProductOffer>,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
