// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::Table;
use crate::pipeline::ExtractionResult;
use crate::utils::error::StorageError;
use rust_xlsxwriter::Workbook;

// Worksheet limits of the xlsx format.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager writing into `base_dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the spreadsheet for the table at zero-based `index`.
    pub fn table_path(&self, index: usize) -> PathBuf {
        self.base_dir.join(format!("extracted_table_{}.xlsx", index + 1))
    }

    /// Writes one table to `extracted_table_<index + 1>.xlsx`. The first row
    /// holds the column indices, then the grid rows follow; missing cells stay empty.
    pub fn save_table(&self, index: usize, table: &Table) -> Result<PathBuf, StorageError> {
        let columns = table.column_count();
        if table.rows.len() + 1 > MAX_ROWS || columns > MAX_COLUMNS {
            return Err(StorageError::TableTooLarge { rows: table.rows.len(), columns });
        }

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for col in 0..columns {
            worksheet.write_number(0, col as u16, col as f64)?;
        }
        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                if let Some(text) = cell {
                    worksheet.write_string(row_idx as u32 + 1, col as u16, text)?;
                }
            }
        }

        let file_path = self.table_path(index);
        workbook.save(&file_path)?;

        tracing::info!("Saved table from page {} to {}", table.page, file_path.display());

        Ok(file_path)
    }

    /// Saves the extraction result as pretty JSON at `path` (relative paths
    /// resolve against the base directory). Pixel data is not included.
    pub fn save_report_json(&self, result: &ExtractionResult, source: &Path, path: &Path) -> Result<PathBuf, StorageError> {
        let file_path = if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) };

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(StorageError::IoError)?;
            }
        }

        let report = serde_json::json!({
            "source": source.display().to_string(),
            "extracted_at": chrono::Utc::now().to_rfc3339(),
            "metadata": result.metadata,
            "sections": result.sections,
            "lists": result.lists,
            "tables": result.tables,
            "images": result.images,
            "failures": result.failures,
            "full_text": result.full_text,
        });

        let report_str =
            serde_json::to_string_pretty(&report).map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, report_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved JSON report to {}", file_path.display());

        Ok(file_path)
    }
}
