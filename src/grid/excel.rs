//! Excel Grid Reader
//!
//! Reads `.xlsx` / `.xls` workbooks through `calamine`. The first worksheet
//! is the grid; every cell is stringified with invariant culture (floats
//! without a fraction print as integers, matching what suppliers see in
//! their spreadsheet).

use crate::error::ProcessingError;
use crate::grid::{CellData, FileData, GridReader, RowData};
use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ExcelGridReader;

impl ExcelGridReader {
    pub fn new() -> Self {
        ExcelGridReader
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            if serial.fract() == 0.0 {
                format!("{}", serial as i64)
            } else {
                format!("{serial}")
            }
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
    }
}

#[async_trait]
impl GridReader for ExcelGridReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx", "xls", "xlsm", "xlsb"]
    }

    async fn read_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<FileData, ProcessingError> {
        let path_buf = path.to_path_buf();
        let file_error = |cause: String| ProcessingError::File {
            path: path_buf.clone(),
            cause,
        };

        // calamine is synchronous; keep the runtime free while it parses.
        let owned = path.to_path_buf();
        let range = tokio::task::spawn_blocking(move || {
            let mut workbook = open_workbook_auto(&owned).map_err(|e| e.to_string())?;
            let sheet_name = workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| "workbook has no sheets".to_string())?;
            workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| file_error(e.to_string()))?
        .map_err(file_error)?;

        if cancel.is_cancelled() {
            return Err(ProcessingError::Canceled);
        }

        // Ranges do not necessarily start at A1; keep absolute coordinates
        // so column letters in the rules line up with what the supplier sees.
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<RowData> = Vec::with_capacity(range.height());

        for (r, row) in range.rows().enumerate() {
            let index = row_offset as usize + r;
            let cells: Vec<CellData> = row
                .iter()
                .enumerate()
                .map(|(c, cell)| CellData {
                    index: col_offset as usize + c,
                    value: cell_to_string(cell),
                })
                .collect();
            rows.push(RowData {
                index,
                cells,
                ..RowData::default()
            });
        }

        Ok(FileData {
            file_path: path.to_path_buf(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_without_fraction_print_as_integers() {
        assert_eq!(cell_to_string(&Data::Float(100.0)), "100");
        assert_eq!(cell_to_string(&Data::Float(19.9)), "19.9");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("EDP".into())), "EDP");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
    }

    #[tokio::test]
    async fn unreadable_workbook_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();

        let reader = ExcelGridReader::new();
        let err = reader
            .read_file(&path, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "FileError");
    }
}
