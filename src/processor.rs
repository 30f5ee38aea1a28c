//! File Processor
//!
//! The orchestrator for one input file: validate the path, bind a
//! correlation id, resolve the supplier, read the grid, apply subtitle
//! handling, parse and normalize every data row, and hand the result to
//! the bulk upsert coordinator, all inside one logical state machine:
//!
//! `Validated → SupplierResolved → GridRead → SubtitlesApplied → Parsed →
//! Upserted → Committed`, with any failure transitioning to `Failed`.
//!
//! Per-file processing is sequential from grid read through commit, so row
//! order and the transaction boundary are preserved; different files may
//! run on parallel tasks, each with its own transaction.

use crate::engine::RowParser;
use crate::error::{ProcessingError, Warning};
use crate::formats::Configuration;
use crate::grid::{GridReaderRegistry, RowData};
use crate::matcher::SupplierMatcher;
use crate::metrics::METRICS;
use crate::normalize::{NormalizedRow, RowNormalizer};
use crate::store::upsert;
use crate::store::CatalogStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Ok,
    DuplicateOffer,
    Canceled,
    Failed,
}

/// Stages of the per-file state machine, logged as the run advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validated,
    SupplierResolved,
    GridRead,
    SubtitlesApplied,
    Parsed,
    Upserted,
    Committed,
}

#[derive(Debug)]
pub struct ProcessingResult {
    pub file_path: PathBuf,
    pub correlation_id: Uuid,
    pub supplier: Option<String>,
    pub status: ProcessingStatus,
    pub rows_read: usize,
    pub rows_parsed: usize,
    pub products_created: usize,
    pub products_updated: usize,
    pub offer_lines_created: usize,
    pub warnings: Vec<Warning>,
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl ProcessingResult {
    fn new(path: &Path, correlation_id: Uuid) -> Self {
        ProcessingResult {
            file_path: path.to_path_buf(),
            correlation_id,
            supplier: None,
            status: ProcessingStatus::Failed,
            rows_read: 0,
            rows_parsed: 0,
            products_created: 0,
            products_updated: 0,
            offer_lines_created: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn dropped_rows(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::RowDropped { .. }))
            .count()
    }
}

pub struct FileProcessor {
    configuration: Arc<Configuration>,
    readers: GridReaderRegistry,
    store: Arc<dyn CatalogStore>,
    /// Lower-case extensions (without dot) accepted by `process_file`
    allowed_extensions: Vec<String>,
}

impl FileProcessor {
    pub fn new(
        configuration: Arc<Configuration>,
        readers: GridReaderRegistry,
        store: Arc<dyn CatalogStore>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        FileProcessor {
            configuration,
            readers,
            store,
            allowed_extensions,
        }
    }

    /// Process one file end to end. Never panics and never returns `Err`:
    /// every failure is folded into the result's status and error list.
    pub async fn process_file(&self, path: &Path, cancel: &CancellationToken) -> ProcessingResult {
        let correlation_id = Uuid::new_v4();
        let started = Instant::now();
        let mut result = ProcessingResult::new(path, correlation_id);

        let span = tracing::info_span!(
            "process_file",
            correlation_id = %correlation_id,
            file = %path.display()
        );

        let outcome = self
            .run(path, cancel, &mut result)
            .instrument(span.clone())
            .await;
        result.duration = started.elapsed();

        let _guard = span.enter();
        match outcome {
            Ok(()) => {
                result.status = ProcessingStatus::Ok;
                METRICS.record_success(
                    result.rows_read,
                    result.products_created,
                    result.products_updated,
                    result.offer_lines_created,
                );
                METRICS.record_dropped_rows(result.dropped_rows());
                info!(
                    supplier = result.supplier.as_deref().unwrap_or("-"),
                    rows = result.rows_read,
                    parsed = result.rows_parsed,
                    lines = result.offer_lines_created,
                    duration_ms = result.duration.as_millis() as u64,
                    "file processed"
                );
            }
            Err(e) => {
                result.status = match &e {
                    ProcessingError::DuplicateOffer { .. } => ProcessingStatus::DuplicateOffer,
                    ProcessingError::Canceled => ProcessingStatus::Canceled,
                    _ => ProcessingStatus::Failed,
                };
                METRICS.record_failure();
                warn!(error = %e, status = ?result.status, "file processing failed");
                result.errors.push(format!("{}: {e}", e.tag()));
            }
        }
        result
    }

    async fn run(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        result: &mut ProcessingResult,
    ) -> Result<(), ProcessingError> {
        self.validate_path(path)?;
        stage(Stage::Validated);

        let snapshot = self.configuration.snapshot();
        let supplier = SupplierMatcher::new(&snapshot)
            .find(path)
            .cloned()
            .ok_or_else(|| ProcessingError::SupplierNotDetected {
                path: path.to_path_buf(),
            })?;
        result.supplier = Some(supplier.name.clone());
        stage(Stage::SupplierResolved);

        let reader = self
            .readers
            .for_path(path)
            .ok_or_else(|| ProcessingError::File {
                path: path.to_path_buf(),
                cause: "no grid reader for this extension".to_string(),
            })?;
        let grid = reader.read_file(path, cancel).await?;
        stage(Stage::GridRead);

        // A header row narrower or wider than configured usually means the
        // supplier changed their layout; worth a heads-up before parsing.
        let structure = &supplier.file_structure;
        if structure.header_row > 0 && structure.expected_column_count > 0 {
            if let Some(header) = grid.rows.iter().find(|r| r.index + 1 == structure.header_row) {
                let found = header.non_blank_count();
                if found != structure.expected_column_count {
                    warn!(
                        expected = structure.expected_column_count,
                        found,
                        "header column count differs from configuration"
                    );
                }
            }
        }

        // Data rows: 1-based start index, spreadsheet convention.
        let start = supplier.file_structure.data_start_row;
        let data_rows: Vec<RowData> = grid
            .rows
            .into_iter()
            .filter(|row| row.index + 1 >= start)
            .collect();

        let rows = match &supplier.subtitles {
            Some(subtitles) => subtitles.apply(data_rows),
            None => data_rows.into_iter().filter(RowData::has_data).collect(),
        };
        result.rows_read = rows.len();
        stage(Stage::SubtitlesApplied);

        let parser = RowParser::new(&supplier);
        let normalizer = RowNormalizer::new(&supplier);
        let mut normalized: Vec<NormalizedRow> = Vec::with_capacity(rows.len());

        for row in &rows {
            if cancel.is_cancelled() {
                return Err(ProcessingError::Canceled);
            }
            if row.is_subtitle_row {
                continue;
            }
            let parsed = parser.parse_row(row);
            result.warnings.extend(parsed.warnings.iter().cloned());
            match normalizer.normalize(&parsed) {
                Ok(row) => normalized.push(row),
                Err(dropped) => {
                    debug!(row = row.index, "row dropped");
                    result.warnings.push(dropped);
                }
            }
        }
        result.rows_parsed = normalized.len();
        stage(Stage::Parsed);

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed");
        let stats = upsert::run(
            self.store.as_ref(),
            &supplier.name,
            supplier.description.as_deref(),
            file_name,
            &supplier.currency,
            &normalized,
            cancel,
        )
        .await?;
        stage(Stage::Upserted);

        result.products_created = stats.products_created;
        result.products_updated = stats.products_updated;
        result.offer_lines_created = stats.offer_lines_created;
        stage(Stage::Committed);
        Ok(())
    }

    fn validate_path(&self, path: &Path) -> Result<(), ProcessingError> {
        if !path.is_absolute() {
            return Err(ProcessingError::Argument {
                message: format!("path must be absolute: {}", path.display()),
            });
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|e| e == &extension) {
            return Err(ProcessingError::Argument {
                message: format!(
                    "unsupported extension '{extension}' (expected one of: {})",
                    self.allowed_extensions.join(", ")
                ),
            });
        }
        if !path.is_file() {
            return Err(ProcessingError::Argument {
                message: format!("no such file: {}", path.display()),
            });
        }
        Ok(())
    }
}

fn stage(stage: Stage) {
    debug!(stage = ?stage, "stage reached");
}
