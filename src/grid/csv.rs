//! CSV Grid Reader
//!
//! Reads delimiter-separated files into the raw string grid. All values
//! stay strings; no type inference happens here, that is the parsing
//! engine's job.
//!
//! ## Format
//!
//! - Fields separated by the configured delimiter (default `,`)
//! - Double-quoted fields may contain the delimiter and doubled quotes
//! - Every line is a row; blank lines become empty rows so row indices
//!   stay aligned with the source file

use crate::error::ProcessingError;
use crate::grid::{FileData, GridReader, RowData};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CsvGridReader {
    delimiter: char,
    quote_char: char,
}

impl CsvGridReader {
    pub fn new() -> Self {
        CsvGridReader {
            delimiter: ',',
            quote_char: '"',
        }
    }

    pub fn with_delimiter(delimiter: char) -> Self {
        CsvGridReader {
            delimiter,
            quote_char: '"',
        }
    }

    /// Parse one line into fields, honoring quotes.
    fn parse_line(&self, line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if in_quotes {
                if c == self.quote_char {
                    if chars.peek() == Some(&self.quote_char) {
                        current.push(self.quote_char);
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    current.push(c);
                }
            } else if c == self.quote_char && current.is_empty() {
                in_quotes = true;
            } else if c == self.delimiter {
                fields.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        fields.push(current);
        fields
    }
}

impl Default for CsvGridReader {
    fn default() -> Self {
        CsvGridReader::new()
    }
}

#[async_trait]
impl GridReader for CsvGridReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    async fn read_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<FileData, ProcessingError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProcessingError::File {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;

        if cancel.is_cancelled() {
            return Err(ProcessingError::Canceled);
        }

        let rows = content
            .lines()
            .enumerate()
            .map(|(index, line)| RowData::new(index, self.parse_line(line)))
            .collect();

        Ok(FileData {
            file_path: path.to_path_buf(),
            rows,
        })
    }
}
