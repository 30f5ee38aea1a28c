//! # Sacks: Supplier Price-List Ingestion Engine
//!
//! Ingests heterogeneous supplier spreadsheets (every supplier with its
//! own column layout, free-text description format and grouping habits)
//! and reduces them to one normalized catalog of suppliers, offers,
//! products and offer lines.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Input file (xlsx / xls / csv)
//!     ↓
//! [Supplier Matcher]        → SupplierConfig (glob detection)
//!     ↓
//! [Grid Reader]             → FileData (raw string grid)
//!     ↓
//! [Subtitle Processor]      → tagged rows + inherited metadata
//!     ↓
//! [Parsing Engine]          → PropertyBag per row (waterfall actions)
//!     ↓
//! [Row Normalizer]          → Product + OfferLine drafts
//!     ↓
//! [Bulk Upsert Coordinator] → one transaction, duplicate-offer safe
//!     ↓
//! Catalog store
//! ```
//!
//! The behavior of each supplier is data, not code: the configuration
//! store loads per-supplier JSON documents (shared lookup tables in the
//! main document) and compiles them into executable rule chains, with hot
//! reload that preserves the identity of the shared aggregate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sacks::formats::ConfigurationStore;
//! use sacks::grid::GridReaderRegistry;
//! use sacks::processor::FileProcessor;
//! use sacks::store::memory::MemoryStore;
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = ConfigurationStore::load("/etc/sacks/supplier-formats")?;
//! let processor = FileProcessor::new(
//!     store.configuration(),
//!     GridReaderRegistry::with_defaults(),
//!     Arc::new(MemoryStore::new()),
//!     vec!["xlsx".into(), "xls".into(), "csv".into()],
//! );
//! let result = processor
//!     .process_file(Path::new("/in/chk_2025-01.xlsx"), &CancellationToken::new())
//!     .await;
//! println!("{:?} ({} lines)", result.status, result.offer_lines_created);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod formats;   // configuration store: documents, lookups, hot reload
pub mod matcher;   // file-name glob detection
pub mod grid;      // raw string grid + readers (csv, excel)
pub mod subtitle;  // subtitle row detection and propagation
pub mod engine;    // the parsing engine: bag, conditions, actions
pub mod normalize; // property bag -> product / offer-line drafts
pub mod store;     // store contract, in-memory backend, bulk upsert
pub mod processor; // per-file orchestration
pub mod metrics;   // process-wide counters

// Re-export the types most embedders touch.
pub use config::AppConfig;
pub use error::{ProcessingError, Warning};
pub use formats::{Configuration, ConfigurationReloaded, ConfigurationStore};
pub use processor::{FileProcessor, ProcessingResult, ProcessingStatus};
