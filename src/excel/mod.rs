//! Excel reading and template patching
//!
//! - Templates (.xlsx/.xlsm): opened as OOXML packages, read cell by cell
//!   with styles and merges, patched per row and re-zipped
//! - Data workbooks and .xls/.ods grids: read through calamine

mod dates;
mod formula;
mod input;
mod package;
mod patch;
mod recalc;
mod sheet;
mod strings;
mod styles;
mod workbook;
mod xml;

pub use dates::{is_builtin_date_format, is_date_format_code, serial_to_datetime};
pub use formula::shift_formula;
pub use input::{data_to_value, parse_input, parse_input_file, CalamineSheet};
pub use package::{Package, PackageError};
pub use patch::{apply_cell_writes, PatchedSheet};
pub use sheet::{OoxmlSheet, RawCell, SheetContext};
pub use styles::StyleSheet;
pub use workbook::{SheetEntry, TemplateWorkbook};

use crate::error::{SheetfillError, SheetfillResult};
use crate::grid::{extract_grid, GridModel};
use crate::types::SheetFormat;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read a workbook file and decide its format from the extension.
pub fn read_workbook_file(path: &Path) -> SheetfillResult<(Arc<[u8]>, SheetFormat)> {
    let format = SheetFormat::from_path(path).ok_or_else(|| {
        SheetfillError::Config(format!(
            "{}: unsupported file type (expected .xlsx, .xlsm, .xls or .ods)",
            path.display()
        ))
    })?;
    let bytes = std::fs::read(path)
        .map_err(|e| SheetfillError::Load(format!("{}: {}", path.display(), e)))?;
    Ok((Arc::from(bytes), format))
}

/// Worksheet names, in workbook order.
pub fn sheet_names(bytes: &Arc<[u8]>, format: SheetFormat) -> SheetfillResult<Vec<String>> {
    if format.supports_batch() {
        Ok(TemplateWorkbook::open(Arc::clone(bytes))?.sheet_names())
    } else {
        CalamineSheet::sheet_names(bytes)
    }
}

/// Extract the grid model of one worksheet (the first when `sheet` is `None`).
pub fn extract_grid_from_bytes(
    bytes: &Arc<[u8]>,
    format: SheetFormat,
    sheet: Option<&str>,
) -> SheetfillResult<GridModel> {
    let grid = if format.supports_batch() {
        let workbook = TemplateWorkbook::open(Arc::clone(bytes))?;
        let index = workbook.sheet_index(sheet)?;
        extract_grid(&workbook.worksheet(index)?)
    } else {
        extract_grid(&CalamineSheet::open(bytes, sheet)?)
    };
    info!(
        sheet = %grid.sheet_name,
        rows = grid.rows.len(),
        merges = grid.merges.region_count(),
        "extracted template grid"
    );
    Ok(grid)
}

pub fn extract_grid_file(path: &Path, sheet: Option<&str>) -> SheetfillResult<GridModel> {
    let (bytes, format) = read_workbook_file(path)?;
    extract_grid_from_bytes(&bytes, format, sheet)
}
