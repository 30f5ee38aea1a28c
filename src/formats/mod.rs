//! Configuration Store
//!
//! Loads the main supplier-formats document (shared lookup tables, common
//! settings, optionally embedded suppliers) and the standalone per-supplier
//! documents from one directory, merges them by supplier name, compiles
//! every rule eagerly, and keeps the result hot-reloadable.
//!
//! The aggregate handed to consumers is a single [`Configuration`] object
//! whose identity never changes: a successful reload replaces the inner
//! snapshot in place, so long-lived readers keep their reference and see
//! the new data on the next `snapshot()` call.

pub mod lookup;
pub mod model;
mod watcher;

pub use watcher::spawn_watcher;

use crate::engine::action::CompiledAction;
use crate::error::ProcessingError;
use crate::grid;
use crate::subtitle::SubtitleHandling;
use lookup::{LookupSet, LookupTable};
use model::{GlobalDoc, SupplierDoc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// File name of the main document.
pub const MAIN_DOCUMENT: &str = "supplier-formats.json";

/// Row geometry of a supplier's files. Row indices are 1-based, matching
/// what the supplier sees in their spreadsheet application.
#[derive(Debug, Clone)]
pub struct FileStructure {
    pub data_start_row: usize,
    pub header_row: usize,
    pub expected_column_count: usize,
}

#[derive(Debug, Clone)]
pub struct ParserSettings {
    pub stop_on_first_match_per_column: bool,
    pub prefer_first_assignment: bool,
    pub default_culture: String,
    pub trace: bool,
}

/// One column's compiled action chain.
#[derive(Debug, Clone)]
pub struct CompiledColumnRule {
    /// The column reference as written ("A", "B", "12")
    pub column: String,
    /// Resolved 0-based column index
    pub column_index: usize,
    pub actions: Vec<CompiledAction>,
}

/// A fully compiled supplier configuration, immutable and shareable.
#[derive(Debug, Clone)]
pub struct CompiledSupplier {
    pub name: String,
    pub currency: String,
    pub description: Option<String>,
    pub file_structure: FileStructure,
    pub file_name_patterns: Vec<glob::Pattern>,
    pub settings: ParserSettings,
    pub rules: Vec<CompiledColumnRule>,
    pub subtitles: Option<SubtitleHandling>,
    /// Shared lookups overlaid with this supplier's overrides
    pub lookups: LookupSet,
}

/// One immutable configuration generation.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub version: String,
    pub lookups: LookupSet,
    pub suppliers: Vec<Arc<CompiledSupplier>>,
}

impl ConfigSnapshot {
    pub fn supplier_by_name(&self, name: &str) -> Option<&Arc<CompiledSupplier>> {
        self.suppliers.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// The process-wide configuration aggregate.
///
/// Readers call [`snapshot`](Configuration::snapshot) once at entry to a
/// file run and work against that immutable generation; the store's reload
/// path is the only writer.
#[derive(Debug)]
pub struct Configuration {
    inner: RwLock<Arc<ConfigSnapshot>>,
}

impl Configuration {
    fn new(snapshot: ConfigSnapshot) -> Self {
        Configuration {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.inner.read().clone()
    }

    /// Replace the inner snapshot, preserving the aggregate's identity.
    pub fn replace_from(&self, next: ConfigSnapshot) {
        *self.inner.write() = Arc::new(next);
    }
}

/// Raised on the broadcast channel after every successful reload.
#[derive(Debug, Clone)]
pub struct ConfigurationReloaded {
    pub version: String,
    pub supplier_count: usize,
}

/// Loads, validates and watches the configuration directory.
#[derive(Debug)]
pub struct ConfigurationStore {
    dir: PathBuf,
    configuration: Arc<Configuration>,
    reload_tx: broadcast::Sender<ConfigurationReloaded>,
}

impl ConfigurationStore {
    /// Load the directory. A failure here is fatal for the process.
    pub fn load(dir: impl Into<PathBuf>) -> Result<ConfigurationStore, ProcessingError> {
        let dir = dir.into();
        let snapshot = load_snapshot(&dir)?;
        info!(
            dir = %dir.display(),
            version = %snapshot.version,
            suppliers = snapshot.suppliers.len(),
            "configuration loaded"
        );
        let (reload_tx, _) = broadcast::channel(16);
        Ok(ConfigurationStore {
            dir,
            configuration: Arc::new(Configuration::new(snapshot)),
            reload_tx,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        self.configuration.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigurationReloaded> {
        self.reload_tx.subscribe()
    }

    /// Reparse the directory. On success the aggregate is updated in place
    /// and subscribers are notified; on failure the previous snapshot stays
    /// active and the error is logged.
    pub fn reload(&self) -> Result<(), ProcessingError> {
        match load_snapshot(&self.dir) {
            Ok(snapshot) => {
                let event = ConfigurationReloaded {
                    version: snapshot.version.clone(),
                    supplier_count: snapshot.suppliers.len(),
                };
                self.configuration.replace_from(snapshot);
                info!(version = %event.version, suppliers = event.supplier_count, "configuration reloaded");
                let _ = self.reload_tx.send(event);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "configuration reload failed, keeping previous version");
                Err(e)
            }
        }
    }
}

/// App-config files that live next to the supplier documents but are not
/// supplier documents.
fn is_app_config(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower == "config.json" || lower.starts_with("appsettings")
}

fn load_snapshot(dir: &Path) -> Result<ConfigSnapshot, ProcessingError> {
    let main_path = dir.join(MAIN_DOCUMENT);
    let config_err = |path: &Path, message: String| ProcessingError::Config {
        file: path.display().to_string(),
        message,
    };

    let main_text = std::fs::read_to_string(&main_path)
        .map_err(|e| config_err(&main_path, e.to_string()))?;
    let main: GlobalDoc =
        serde_json::from_str(&main_text).map_err(|e| config_err(&main_path, e.to_string()))?;

    let shared = build_lookup_set(&main.lookups);

    // Embedded suppliers first, then standalone files in lexicographic
    // order; later documents replace earlier ones of the same name.
    let mut docs: Vec<(String, SupplierDoc)> = main
        .suppliers
        .iter()
        .map(|doc| (MAIN_DOCUMENT.to_string(), doc.clone()))
        .collect();

    let mut standalone: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| config_err(dir, e.to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|name| {
                    name != MAIN_DOCUMENT && !is_app_config(name)
                })
        })
        .collect();
    standalone.sort();

    for path in standalone {
        let text = std::fs::read_to_string(&path).map_err(|e| config_err(&path, e.to_string()))?;
        let doc: SupplierDoc =
            serde_json::from_str(&text).map_err(|e| config_err(&path, e.to_string()))?;
        let source = path.display().to_string();
        match docs.iter().position(|(_, d)| d.name.eq_ignore_ascii_case(&doc.name)) {
            Some(idx) => {
                warn!(supplier = %doc.name, file = %source, "supplier redefined, later file wins");
                docs[idx] = (source, doc);
            }
            None => docs.push((source, doc)),
        }
    }

    let mut suppliers = Vec::with_capacity(docs.len());
    for (_, doc) in &docs {
        suppliers.push(Arc::new(compile_supplier(doc, &shared)?));
    }

    Ok(ConfigSnapshot {
        version: main.version,
        lookups: shared,
        suppliers,
    })
}

fn build_lookup_set(raw: &std::collections::HashMap<String, model::Params>) -> LookupSet {
    let mut set = LookupSet::new();
    for (name, entries) in raw {
        let mut table = LookupTable::new(name.clone());
        for (input, canonical) in entries.iter() {
            table.insert(input, canonical);
        }
        set.insert(table);
    }
    set
}

/// Compile and validate one supplier document against a set of shared
/// lookup tables. Also used standalone by `validate-config`.
pub fn compile_supplier(
    doc: &SupplierDoc,
    shared: &LookupSet,
) -> Result<CompiledSupplier, ProcessingError> {
    let supplier_err = |column: &str, action: usize, message: String| ProcessingError::Validation {
        supplier: doc.name.clone(),
        column: column.to_string(),
        action,
        message,
    };

    if doc.name.trim().is_empty() {
        return Err(supplier_err("-", 0, "supplier name must not be empty".to_string()));
    }
    let currency = doc.currency.trim().to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(supplier_err(
            "-",
            0,
            format!("currency '{}' must be 3 letters", doc.currency),
        ));
    }

    let lookups = shared.merged_with(&build_lookup_set(&doc.lookups));

    let file_name_patterns = doc
        .file_structure
        .detection
        .file_name_patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| supplier_err("-", 0, format!("detection pattern '{p}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rules = Vec::with_capacity(doc.parser_config.column_rules.len());
    for rule in &doc.parser_config.column_rules {
        let column_index = grid::column_index(&rule.column).ok_or_else(|| {
            supplier_err(&rule.column, 0, format!("invalid column reference '{}'", rule.column))
        })?;

        let mut actions = Vec::with_capacity(rule.actions.len());
        for (idx, action) in rule.actions.iter().enumerate() {
            let compiled = CompiledAction::build(action, &lookups)
                .map_err(|message| supplier_err(&rule.column, idx, message))?;
            actions.push(compiled);
        }
        rules.push(CompiledColumnRule {
            column: rule.column.clone(),
            column_index,
            actions,
        });
    }

    let subtitles = doc
        .subtitle_handling
        .as_ref()
        .map(|sub| {
            SubtitleHandling::build(sub, doc.file_structure.expected_column_count, &lookups)
                .map_err(|message| supplier_err("-", 0, message))
        })
        .transpose()?;

    let settings = &doc.parser_config.settings;
    Ok(CompiledSupplier {
        name: doc.name.clone(),
        currency,
        description: doc.description.clone(),
        file_structure: FileStructure {
            data_start_row: doc.file_structure.data_start_row_index,
            header_row: doc.file_structure.header_row_index,
            expected_column_count: doc.file_structure.expected_column_count,
        },
        file_name_patterns,
        settings: ParserSettings {
            stop_on_first_match_per_column: settings.stop_on_first_match_per_column,
            prefer_first_assignment: settings.prefer_first_assignment,
            default_culture: settings.default_culture.clone(),
            trace: settings.trace,
        },
        rules,
        subtitles,
        lookups,
    })
}
