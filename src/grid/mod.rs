//! Grid extraction: a worksheet turned into a renderable grid of cells
//!
//! The grid covers `[min_row..=max_row] × [min_col..=max_col]`. Cells covered
//! by a merged region are folded into the region's anchor, which carries the
//! full row/column span, so the grid renders without overlapping cells.
//!
//! Extraction is best-effort: a cell that cannot be read becomes a neutral
//! placeholder and its address is listed in [`GridModel::placeholders`].

mod merge;
mod value;

pub use merge::{MergeIndex, MergeRole, RawMergeRange};
pub use value::{format_number, CellStyle, CellValue, ScalarValue};

use crate::address::{CellAddress, CellRange};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Window used when a sheet has neither declared bounds nor content.
pub const DEFAULT_ROWS: u32 = 50;
pub const DEFAULT_COLS: u32 = 26;

/// Largest grid rendered, in cells. Declared bounds beyond it are treated as
/// malformed; scanned bounds are clamped to it.
pub const MAX_GRID_AREA: u64 = 2_000_000;

/// Failure to read one cell.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct CellReadError(pub String);

/// A cell as read from a worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetCell {
    pub value: Option<CellValue>,
    /// `None` when the source format carries no style information.
    pub style: Option<CellStyle>,
}

/// Read capabilities the grid engine needs from a parsed worksheet.
pub trait Worksheet {
    fn name(&self) -> &str;

    /// Bounds declared in the sheet's metadata. `None` when absent or malformed.
    fn declared_dimension(&self) -> Option<CellRange>;

    /// Addresses of every cell holding a value.
    fn populated_cells(&self) -> Vec<CellAddress>;

    /// `Ok(None)` when the sheet has no record of the cell.
    fn cell(&self, at: CellAddress) -> Result<Option<SheetCell>, CellReadError>;

    /// Structured enumeration of merged regions, when the codec offers one.
    fn merged_regions(&self) -> Option<Vec<CellRange>>;

    /// Codec-internal merge table, consulted when `merged_regions` is `None`.
    fn merge_table(&self) -> Option<Vec<RawMergeRange>> {
        None
    }

    fn row_height(&self, _row: u32) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionSource {
    Declared,
    Scanned,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub address: String,
    pub value: Option<String>,
    pub is_merged: bool,
    pub is_merge_start: bool,
    pub colspan: u32,
    pub rowspan: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<CellStyle>,
}

impl GridCell {
    fn placeholder(at: CellAddress) -> Self {
        Self {
            address: at.to_string(),
            value: None,
            is_merged: false,
            is_merge_start: false,
            colspan: 1,
            rowspan: 1,
            style: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridModel {
    pub sheet_name: String,
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
    pub dimension_source: DimensionSource,
    pub rows: Vec<GridRow>,
    pub merges: MergeIndex,
    /// Cells that failed to read and were replaced by placeholders.
    pub placeholders: Vec<String>,
}

impl GridModel {
    /// All emitted cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.rows.iter().flat_map(|row| row.cells.iter())
    }

    pub fn cell(&self, address: &str) -> Option<&GridCell> {
        self.cells().find(|cell| cell.address == address)
    }

    pub fn bounds(&self) -> CellRange {
        CellRange::new(
            CellAddress::new(self.min_row, self.min_col),
            CellAddress::new(self.max_row, self.max_col),
        )
    }

    pub fn merges(&self) -> &MergeIndex {
        &self.merges
    }
}

/// Build the grid model for a worksheet.
pub fn extract_grid(sheet: &dyn Worksheet) -> GridModel {
    let (bounds, dimension_source) = grid_bounds(sheet);
    let merges = MergeIndex::build(sheet);
    debug!(
        sheet = sheet.name(),
        bounds = %bounds,
        source = ?dimension_source,
        merges = merges.region_count(),
        "extracting grid"
    );

    let mut rows = Vec::with_capacity(bounds.row_span() as usize);
    let mut placeholders = Vec::new();

    for row in bounds.start.row..=bounds.end.row {
        let mut cells = Vec::new();
        for col in bounds.start.col..=bounds.end.col {
            let at = CellAddress::new(row, col);
            let role = merges.classify(at);
            if let MergeRole::Member(_) = role {
                continue;
            }
            match grid_cell(sheet, at, role) {
                Ok(cell) => cells.push(cell),
                Err(err) => {
                    warn!(sheet = sheet.name(), cell = %at, error = %err, "unreadable cell replaced by placeholder");
                    placeholders.push(at.to_string());
                    cells.push(GridCell::placeholder(at));
                }
            }
        }
        rows.push(GridRow {
            number: row,
            height: sheet.row_height(row),
            cells,
        });
    }

    GridModel {
        sheet_name: sheet.name().to_string(),
        min_row: bounds.start.row,
        max_row: bounds.end.row,
        min_col: bounds.start.col,
        max_col: bounds.end.col,
        dimension_source,
        rows,
        merges,
        placeholders,
    }
}

fn grid_cell(
    sheet: &dyn Worksheet,
    at: CellAddress,
    role: MergeRole,
) -> Result<GridCell, CellReadError> {
    let cell = sheet.cell(at)?;
    let (is_merged, is_merge_start, colspan, rowspan) = match role {
        MergeRole::Anchor(range) => (true, true, range.col_span(), range.row_span()),
        _ => (false, false, 1, 1),
    };
    let (value, style) = match cell {
        Some(cell) => (cell.value.and_then(|v| v.display()), cell.style),
        None => (None, None),
    };
    Ok(GridCell {
        address: at.to_string(),
        value,
        is_merged,
        is_merge_start,
        colspan,
        rowspan,
        style,
    })
}

/// Declared bounds, else the extent of populated cells, else the default window.
fn grid_bounds(sheet: &dyn Worksheet) -> (CellRange, DimensionSource) {
    if let Some(declared) = sheet.declared_dimension() {
        if declared.area() <= MAX_GRID_AREA {
            return (declared, DimensionSource::Declared);
        }
        warn!(
            sheet = sheet.name(),
            dimension = %declared,
            "declared dimension too large, scanning cells instead"
        );
    }

    let mut populated = sheet.populated_cells();
    if !populated.is_empty() {
        populated.sort();
        let (mut max_row, mut max_col) = (1u32, 1u32);
        let mut dropped = 0usize;
        for at in &populated {
            let (row, col) = (max_row.max(at.row), max_col.max(at.col));
            if row as u64 * col as u64 > MAX_GRID_AREA {
                dropped += 1;
                continue;
            }
            (max_row, max_col) = (row, col);
        }
        if dropped > 0 {
            warn!(
                sheet = sheet.name(),
                dropped,
                extent = %CellAddress::new(max_row, max_col),
                "populated cells too far apart, clamping the grid"
            );
        }
        return (
            CellRange::new(CellAddress::new(1, 1), CellAddress::new(max_row, max_col)),
            DimensionSource::Scanned,
        );
    }

    (
        CellRange::new(
            CellAddress::new(1, 1),
            CellAddress::new(DEFAULT_ROWS, DEFAULT_COLS),
        ),
        DimensionSource::Default,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// In-memory worksheet for exercising the engine without a codec.
    #[derive(Default)]
    pub(crate) struct MemorySheet {
        pub dimension: Option<CellRange>,
        pub cells: HashMap<CellAddress, SheetCell>,
        pub broken: Vec<CellAddress>,
        pub regions: Option<Vec<CellRange>>,
        pub table: Option<Vec<RawMergeRange>>,
    }

    impl MemorySheet {
        pub fn with_merge(mut self, range: &str) -> Self {
            self.regions
                .get_or_insert_with(Vec::new)
                .push(range.parse().unwrap());
            self
        }

        pub fn with_text(mut self, address: &str, text: &str) -> Self {
            self.cells.insert(
                address.parse().unwrap(),
                SheetCell {
                    value: Some(CellValue::text(text)),
                    style: Some(CellStyle::default()),
                },
            );
            self
        }
    }

    impl Worksheet for MemorySheet {
        fn name(&self) -> &str {
            "Memory"
        }

        fn declared_dimension(&self) -> Option<CellRange> {
            self.dimension
        }

        fn populated_cells(&self) -> Vec<CellAddress> {
            self.cells
                .iter()
                .filter(|(_, c)| c.value.is_some())
                .map(|(a, _)| *a)
                .collect()
        }

        fn cell(&self, at: CellAddress) -> Result<Option<SheetCell>, CellReadError> {
            if self.broken.contains(&at) {
                return Err(CellReadError(format!("corrupt cell {}", at)));
            }
            Ok(self.cells.get(&at).cloned())
        }

        fn merged_regions(&self) -> Option<Vec<CellRange>> {
            self.regions.clone()
        }

        fn merge_table(&self) -> Option<Vec<RawMergeRange>> {
            self.table.clone()
        }
    }

    fn addresses(grid: &GridModel) -> Vec<String> {
        grid.cells().map(|c| c.address.clone()).collect()
    }

    #[test]
    fn test_merge_anchor_carries_span_and_members_are_skipped() {
        let sheet = MemorySheet {
            dimension: Some("A1:C3".parse().unwrap()),
            regions: Some(vec!["A2:B3".parse().unwrap()]),
            ..Default::default()
        }
        .with_text("A2", "Merged");

        let grid = extract_grid(&sheet);
        let anchor = grid.cell("A2").unwrap();
        assert_eq!(anchor.colspan, 2);
        assert_eq!(anchor.rowspan, 2);
        assert!(anchor.is_merged && anchor.is_merge_start);
        assert_eq!(anchor.value.as_deref(), Some("Merged"));
        for member in ["B2", "A3", "B3"] {
            assert!(grid.cell(member).is_none(), "{} should be folded", member);
        }
        assert_eq!(
            addresses(&grid),
            vec!["A1", "B1", "C1", "A2", "C2", "C3"]
        );
    }

    #[test]
    fn test_merge_table_fallback_matches_structured_regions() {
        let structured = MemorySheet {
            dimension: Some("A1:D4".parse().unwrap()),
            regions: Some(vec!["B2:C4".parse().unwrap()]),
            ..Default::default()
        };
        let table = MemorySheet {
            dimension: Some("A1:D4".parse().unwrap()),
            table: Some(vec![
                RawMergeRange {
                    top: Some(2),
                    left: Some(2),
                    bottom: Some(4),
                    right: Some(3),
                },
                RawMergeRange::default(),
            ]),
            ..Default::default()
        };

        let a = extract_grid(&structured);
        let b = extract_grid(&table);
        assert_eq!(addresses(&a), addresses(&b));
        assert_eq!(a.cell("B2"), b.cell("B2"));
        assert_eq!(a.merges.to_address_map(), b.merges.to_address_map());
    }

    #[test]
    fn test_no_merge_information_gives_empty_index() {
        let sheet = MemorySheet {
            dimension: Some("A1:B2".parse().unwrap()),
            ..Default::default()
        };
        let grid = extract_grid(&sheet);
        assert!(grid.merges.is_empty());
        assert_eq!(grid.cells().count(), 4);
    }

    #[test]
    fn test_dimension_inferred_from_populated_cells() {
        let sheet = MemorySheet::default()
            .with_text("B2", "x")
            .with_text("E7", "y");
        let grid = extract_grid(&sheet);
        assert_eq!(grid.dimension_source, DimensionSource::Scanned);
        assert_eq!((grid.min_row, grid.max_row), (1, 7));
        assert_eq!((grid.min_col, grid.max_col), (1, 5));
        assert_eq!(grid.rows.len(), 7);
        assert_eq!(grid.rows[0].cells.len(), 5);
    }

    #[test]
    fn test_empty_sheet_uses_default_window() {
        let grid = extract_grid(&MemorySheet::default());
        assert_eq!(grid.dimension_source, DimensionSource::Default);
        assert_eq!(grid.max_row, DEFAULT_ROWS);
        assert_eq!(grid.max_col, DEFAULT_COLS);
        assert_eq!(grid.cells().count(), (DEFAULT_ROWS * DEFAULT_COLS) as usize);
    }

    #[test]
    fn test_oversized_declared_dimension_falls_back_to_scan() {
        let sheet = MemorySheet {
            dimension: Some("A1:XFD1048576".parse().unwrap()),
            ..Default::default()
        }
        .with_text("C3", "z");
        let grid = extract_grid(&sheet);
        assert_eq!(grid.dimension_source, DimensionSource::Scanned);
        assert_eq!(grid.bounds().to_string(), "A1:C3");
    }

    #[test]
    fn test_stray_far_cell_clamps_scanned_bounds() {
        let sheet = MemorySheet::default()
            .with_text("C3", "z")
            .with_text("XFD1048576", "stray");
        let grid = extract_grid(&sheet);
        assert_eq!(grid.dimension_source, DimensionSource::Scanned);
        assert_eq!(grid.bounds().to_string(), "A1:C3");
        assert!(grid.bounds().area() <= MAX_GRID_AREA);
    }

    #[test]
    fn test_broken_cell_becomes_placeholder() {
        let mut sheet = MemorySheet {
            dimension: Some("A1:B1".parse().unwrap()),
            ..Default::default()
        }
        .with_text("A1", "ok")
        .with_text("B1", "lost");
        sheet.broken.push("B1".parse().unwrap());

        let grid = extract_grid(&sheet);
        assert_eq!(grid.cell("A1").unwrap().value.as_deref(), Some("ok"));
        let placeholder = grid.cell("B1").unwrap();
        assert_eq!(placeholder, &GridCell::placeholder("B1".parse().unwrap()));
        assert_eq!(grid.placeholders, vec!["B1".to_string()]);
    }

    #[test]
    fn test_grid_serializes_camel_case() {
        let sheet = MemorySheet {
            dimension: Some("A1".parse().unwrap()),
            ..Default::default()
        }
        .with_text("A1", "v");
        let json = serde_json::to_value(extract_grid(&sheet)).unwrap();
        assert_eq!(json["rows"][0]["cells"][0]["isMergeStart"], false);
        assert_eq!(json["dimensionSource"], "declared");
    }
}
