//! Batch materialization: one filled copy of the template per data row
//!
//! Every row starts from a fresh parse of the original template bytes, so
//! values written for one row can never leak into the next. Rows run
//! strictly in order.

use crate::error::{SheetfillError, SheetfillResult};
use crate::excel::TemplateWorkbook;
use crate::mapping::ColumnMapping;
use crate::types::{DataRow, OutputArtifact, SheetFormat};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A parsed, writable copy of a template.
pub trait TemplateBook {
    fn write_cell(&mut self, address: &str, value: &str) -> SheetfillResult<()>;
    fn to_bytes(&self) -> SheetfillResult<Vec<u8>>;
}

/// Turns template bytes into a [`TemplateBook`].
pub trait WorkbookCodec {
    type Book: TemplateBook;

    fn open(&self, template: &Arc<[u8]>) -> SheetfillResult<Self::Book>;
}

/// OOXML (.xlsx/.xlsm) codec writing into one worksheet: the named one, or
/// the first.
#[derive(Debug, Clone, Default)]
pub struct OoxmlCodec {
    pub sheet: Option<String>,
}

impl OoxmlCodec {
    pub fn new(sheet: Option<String>) -> Self {
        Self { sheet }
    }
}

pub struct OoxmlBook {
    workbook: TemplateWorkbook,
    sheet: usize,
}

impl TemplateBook for OoxmlBook {
    fn write_cell(&mut self, address: &str, value: &str) -> SheetfillResult<()> {
        self.workbook.set_cell_value(self.sheet, address, value)
    }

    fn to_bytes(&self) -> SheetfillResult<Vec<u8>> {
        self.workbook.to_bytes()
    }
}

impl WorkbookCodec for OoxmlCodec {
    type Book = OoxmlBook;

    fn open(&self, template: &Arc<[u8]>) -> SheetfillResult<OoxmlBook> {
        let workbook = TemplateWorkbook::open(Arc::clone(template))?;
        let sheet = workbook.sheet_index(self.sheet.as_deref())?;
        Ok(OoxmlBook { workbook, sheet })
    }
}

/// Everything a batch produced, plus everything it recovered from.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// In input row order.
    pub artifacts: Vec<OutputArtifact>,
    /// One [`SheetfillError::RowMaterialization`] per skipped row.
    pub row_failures: Vec<SheetfillError>,
    /// One [`SheetfillError::CellWrite`] per mapping that could not be written.
    pub cell_failures: Vec<SheetfillError>,
    pub total_rows: usize,
}

impl BatchOutcome {
    pub fn skipped_rows(&self) -> usize {
        self.row_failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.row_failures.is_empty() && self.cell_failures.is_empty()
    }
}

/// Percentage of rows handled after row `index` (0-based) of `total`.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (((index + 1) as f64 / total as f64) * 100.0).round() as u8
}

/// Fill the template once per row.
///
/// The template is opened once before any row is processed; a template that
/// cannot be loaded fails the whole batch. After that, a failing mapping is
/// recorded and the row continues, and a failing row is recorded and
/// skipped. `on_progress` is called after every row, skipped or not.
pub fn run_batch<C: WorkbookCodec>(
    codec: &C,
    template: &Arc<[u8]>,
    format: SheetFormat,
    rows: &[DataRow],
    mappings: &[ColumnMapping],
    mut on_progress: impl FnMut(u8),
) -> SheetfillResult<BatchOutcome> {
    codec.open(template)?;

    let mut outcome = BatchOutcome {
        total_rows: rows.len(),
        ..Default::default()
    };

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        match materialize_row(codec, template, row_number, row, mappings, &mut outcome.cell_failures) {
            Ok(data) => {
                debug!(row = row_number, bytes = data.len(), "materialized row");
                outcome.artifacts.push(OutputArtifact {
                    name: format!("output_{}", row_number),
                    row_index: index,
                    format,
                    data,
                });
            }
            Err(err) => {
                warn!(row = row_number, error = %err, "skipping row");
                outcome.row_failures.push(err);
            }
        }
        on_progress(progress_percent(index, rows.len()));
    }

    info!(
        rows = rows.len(),
        artifacts = outcome.artifacts.len(),
        skipped = outcome.skipped_rows(),
        cell_failures = outcome.cell_failures.len(),
        "batch finished"
    );
    Ok(outcome)
}

fn materialize_row<C: WorkbookCodec>(
    codec: &C,
    template: &Arc<[u8]>,
    row_number: usize,
    row: &DataRow,
    mappings: &[ColumnMapping],
    cell_failures: &mut Vec<SheetfillError>,
) -> SheetfillResult<Vec<u8>> {
    let row_error = |err: SheetfillError| SheetfillError::RowMaterialization {
        row: row_number,
        reason: err.to_string(),
    };

    let mut book = codec.open(template).map_err(row_error)?;
    for mapping in mappings {
        let value = row.get(&mapping.source_column).unwrap_or("");
        if let Err(err) = book.write_cell(&mapping.target_cell, value) {
            warn!(
                row = row_number,
                cell = %mapping.target_cell,
                column = %mapping.source_column,
                error = %err,
                "cell write failed"
            );
            cell_failures.push(SheetfillError::CellWrite {
                row: row_number,
                address: mapping.target_cell.clone(),
                reason: err.to_string(),
            });
        }
    }
    book.to_bytes().map_err(row_error)
}

/// [`run_batch`] with the OOXML codec.
pub fn run_template_batch(
    template: &Arc<[u8]>,
    format: SheetFormat,
    sheet: Option<&str>,
    rows: &[DataRow],
    mappings: &[ColumnMapping],
    on_progress: impl FnMut(u8),
) -> SheetfillResult<BatchOutcome> {
    if !format.supports_batch() {
        return Err(SheetfillError::Load(format!(
            ".{} templates cannot be filled; use .xlsx or .xlsm",
            format.extension()
        )));
    }
    let codec = OoxmlCodec::new(sheet.map(str::to_string));
    run_batch(&codec, template, format, rows, mappings, on_progress)
}
