//! Grid Model and Readers
//!
//! The 2D string grid a spreadsheet reader delivers: ordered rows of
//! ordered cells, all values pre-stringified. The [`GridReader`] trait is
//! the external contract; CSV and Excel implementations live in the
//! submodules and are dispatched by file extension through the
//! [`GridReaderRegistry`].

use crate::error::ProcessingError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod csv;
mod excel;

pub use csv::CsvGridReader;
pub use excel::ExcelGridReader;

/// One cell: its 0-based column index and raw string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellData {
    pub index: usize,
    pub value: String,
}

/// One row of the grid, plus the subtitle metadata attached by the
/// subtitle processor.
#[derive(Debug, Clone, Default)]
pub struct RowData {
    /// 0-based position in the file
    pub index: usize,
    pub cells: Vec<CellData>,
    pub is_subtitle_row: bool,
    /// Name of the subtitle rule that matched this row
    pub subtitle_rule: Option<String>,
    /// Inherited (or own) subtitle values, in capture order
    pub subtitle_data: Vec<(String, String)>,
}

impl RowData {
    /// Build a dense row from plain values.
    pub fn new(index: usize, values: Vec<String>) -> Self {
        RowData {
            index,
            cells: values
                .into_iter()
                .enumerate()
                .map(|(index, value)| CellData { index, value })
                .collect(),
            ..RowData::default()
        }
    }

    pub fn cell_value(&self, column: usize) -> Option<&str> {
        self.cells
            .iter()
            .find(|c| c.index == column)
            .map(|c| c.value.as_str())
    }

    /// Any non-blank cell at all.
    pub fn has_data(&self) -> bool {
        self.cells.iter().any(|c| !c.value.trim().is_empty())
    }

    pub fn non_blank_count(&self) -> usize {
        self.cells.iter().filter(|c| !c.value.trim().is_empty()).count()
    }

    pub fn non_blank_values(&self) -> impl Iterator<Item = &str> {
        self.cells
            .iter()
            .map(|c| c.value.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn first_non_blank(&self) -> Option<&str> {
        self.non_blank_values().next()
    }

    /// Subtitle value under `key`, case-insensitive.
    pub fn subtitle_value(&self, key: &str) -> Option<&str> {
        self.subtitle_data
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// The whole grid of one input file.
#[derive(Debug, Clone, Default)]
pub struct FileData {
    pub file_path: PathBuf,
    pub rows: Vec<RowData>,
}

/// Convert a column reference, a letter run (`"A"`, `"AB"`) or a 1-based
/// number (`"3"`), to a 0-based index.
pub fn column_index(column: &str) -> Option<usize> {
    let column = column.trim();
    if column.is_empty() {
        return None;
    }
    if column.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = column.parse().ok()?;
        return n.checked_sub(1);
    }
    let mut index: usize = 0;
    for c in column.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    index.checked_sub(1)
}

/// The inverse of [`column_index`] for letters: 0 -> "A", 27 -> "AB".
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A spreadsheet byte reader: turns a file into a [`FileData`] grid of raw
/// strings. Numbers are stringified with invariant culture by the reader.
#[async_trait]
pub trait GridReader: Send + Sync {
    /// Lower-case extensions (without dot) this reader handles.
    fn extensions(&self) -> &'static [&'static str];

    async fn read_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<FileData, ProcessingError>;
}

/// Dispatches files to readers by extension.
#[derive(Clone, Default)]
pub struct GridReaderRegistry {
    readers: Vec<Arc<dyn GridReader>>,
}

impl GridReaderRegistry {
    pub fn new() -> Self {
        GridReaderRegistry::default()
    }

    /// A registry with the built-in CSV and Excel readers.
    pub fn with_defaults() -> Self {
        let mut registry = GridReaderRegistry::new();
        registry.register(Arc::new(CsvGridReader::new()));
        registry.register(Arc::new(ExcelGridReader::new()));
        registry
    }

    pub fn register(&mut self, reader: Arc<dyn GridReader>) {
        self.readers.push(reader);
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn GridReader>> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.readers
            .iter()
            .find(|r| r.extensions().contains(&ext.as_str()))
            .cloned()
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.readers.iter().flat_map(|r| r.extensions()).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_round_trip() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("Z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("AB"), Some(27));
        assert_eq!(column_index("c"), Some(2));
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(27), "AB");
        for i in 0..200 {
            assert_eq!(column_index(&column_letter(i)), Some(i));
        }
    }

    #[test]
    fn numeric_column_references_are_one_based() {
        assert_eq!(column_index("1"), Some(0));
        assert_eq!(column_index("10"), Some(9));
        assert_eq!(column_index("0"), None);
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn row_data_blank_accounting() {
        let row = RowData::new(0, vec!["CHANEL".into(), " ".into(), String::new(), "x".into()]);
        assert!(row.has_data());
        assert_eq!(row.non_blank_count(), 2);
        assert_eq!(row.first_non_blank(), Some("CHANEL"));
        assert_eq!(row.cell_value(1), Some(" "));
        assert_eq!(row.cell_value(9), None);
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let registry = GridReaderRegistry::with_defaults();
        assert!(registry.for_path(Path::new("/tmp/a.csv")).is_some());
        assert!(registry.for_path(Path::new("/tmp/a.XLSX")).is_some());
        assert!(registry.for_path(Path::new("/tmp/a.pdf")).is_none());
        assert!(registry.for_path(Path::new("/tmp/noext")).is_none());
    }
}
