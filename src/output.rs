use std::fs;
use std::io::{self, Write};
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::pipeline::summary::OwnerSummary;
use crate::pipeline::{OwnerRow, COLUMNS};

const SUMMARY_COLUMNS: [&str; 3] = ["owner_encoded_id", "owner_address_encoded_ids", "nft_count"];

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("xlsx error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported output format for {0:?} (expected .xlsx or .csv)")]
    UnsupportedFormat(String),
}

/// Serializes a finished result set to `dest`. The destination is replaced whole or not at all.
pub trait TableWriter {
    fn write(&self, rows: &[OwnerRow], dest: &Path) -> Result<(), WriteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, WriteError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("xlsx") => Ok(OutputFormat::Xlsx),
            Some("csv") => Ok(OutputFormat::Csv),
            _ => Err(WriteError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn supports_summary(self) -> bool {
        matches!(self, OutputFormat::Xlsx)
    }

    /// `owners` is only written by formats that support a summary sheet.
    pub fn writer(self, owners: Option<Vec<OwnerSummary>>) -> Box<dyn TableWriter> {
        match self {
            OutputFormat::Xlsx => Box::new(XlsxTable { owners }),
            OutputFormat::Csv => Box::new(CsvTable),
        }
    }
}

/// `Sheet1` holds the rows; with `owners`, an `Owners` sheet lists them per DID.
///
/// `owners` covers the full row set, taken before any deduplication of `rows`.
pub struct XlsxTable {
    pub owners: Option<Vec<OwnerSummary>>,
}

impl XlsxTable {
    fn render(&self, rows: &[OwnerRow]) -> Result<Vec<u8>, WriteError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Sheet1")?;
            for (col, name) in COLUMNS.iter().enumerate() {
                sheet.write_string_with_format(0, col as u16, *name, &header)?;
                sheet.set_column_width(col as u16, 48)?;
            }
            for (i, row) in rows.iter().enumerate() {
                for (col, value) in row.fields().iter().enumerate() {
                    sheet.write_string(i as u32 + 1, col as u16, *value)?;
                }
            }
        }

        if let Some(owners) = &self.owners {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Owners")?;
            for (col, name) in SUMMARY_COLUMNS.iter().enumerate() {
                sheet.write_string_with_format(0, col as u16, *name, &header)?;
            }
            sheet.set_column_width(0, 48)?;
            sheet.set_column_width(1, 96)?;
            for (i, owner) in owners.iter().enumerate() {
                let r = i as u32 + 1;
                sheet.write_string(r, 0, &owner.owner_encoded_id)?;
                sheet.write_string(r, 1, owner.addresses.join(", "))?;
                sheet.write_number(r, 2, owner.nft_count as f64)?;
            }
        }

        Ok(workbook.save_to_buffer()?)
    }
}

impl TableWriter for XlsxTable {
    fn write(&self, rows: &[OwnerRow], dest: &Path) -> Result<(), WriteError> {
        let bytes = self.render(rows)?;
        atomic_write_bytes(dest, &bytes)?;
        debug!("Wrote {} rows ({} bytes) to {:?}", rows.len(), bytes.len(), dest);
        Ok(())
    }
}

pub struct CsvTable;

impl CsvTable {
    fn render(rows: &[OwnerRow]) -> Result<Vec<u8>, WriteError> {
        let mut w = csv::Writer::from_writer(Vec::new());
        w.write_record(COLUMNS)?;
        for row in rows {
            w.write_record(row.fields())?;
        }
        w.into_inner().map_err(|e| WriteError::Io(e.into_error()))
    }
}

impl TableWriter for CsvTable {
    fn write(&self, rows: &[OwnerRow], dest: &Path) -> Result<(), WriteError> {
        let bytes = Self::render(rows)?;
        atomic_write_bytes(dest, &bytes)?;
        debug!("Wrote {} rows ({} bytes) to {:?}", rows.len(), bytes.len(), dest);
        Ok(())
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for a bare file name like `output.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Write to a temp file next to `dest`, sync it, then rename over `dest`.
fn atomic_write_bytes(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
