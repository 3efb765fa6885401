//! Data workbooks and non-OOXML grids, read through calamine

use crate::address::{CellAddress, CellRange};
use crate::error::{SheetfillError, SheetfillResult};
use crate::grid::{CellReadError, CellValue, ScalarValue, SheetCell, Worksheet};
use crate::types::{DataRow, InputData};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use serde_json::json;
use std::io::Cursor;
use tracing::{debug, info};

/// Headers used when the header row is entirely empty.
pub const DEFAULT_HEADER_COUNT: u32 = 10;

pub fn default_header(col: u32) -> String {
    format!("Column {}", col)
}

/// Interpret one calamine cell. `None` for empty cells.
pub fn data_to_value(data: &Data) -> Option<CellValue> {
    match data {
        Data::Empty => None,
        Data::String(s) => Some(CellValue::text(s.clone())),
        Data::Int(i) => Some(CellValue::number(*i as f64)),
        Data::Float(f) => Some(CellValue::number(*f)),
        Data::Bool(b) => Some(CellValue::Scalar(ScalarValue::Bool(*b))),
        Data::DateTime(dt) => Some(match dt.as_datetime() {
            Some(ndt) if dt.is_datetime() => CellValue::DateValue(ndt),
            _ => CellValue::number(dt.as_f64()),
        }),
        Data::DateTimeIso(s) => Some(
            chrono::NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(CellValue::DateValue)
                .unwrap_or_else(|| CellValue::text(s.clone())),
        ),
        Data::DurationIso(s) => Some(CellValue::text(s.clone())),
        Data::Error(e) => Some(CellValue::Other(json!({ "error": e.to_string() }))),
    }
}

type AnySheets = Sheets<Cursor<Vec<u8>>>;

fn open_any(bytes: &[u8]) -> Result<AnySheets, calamine::Error> {
    open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
}

/// Parse a data workbook: first sheet, row 1 as headers, every later
/// non-empty row as a [`DataRow`].
pub fn parse_input(bytes: &[u8]) -> SheetfillResult<InputData> {
    let mut workbook = open_any(bytes).map_err(|e| SheetfillError::Parse(e.to_string()))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SheetfillError::Parse("workbook contains no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| SheetfillError::Parse(format!("sheet '{}': {}", first, e)))?;

    let data = rows_from_range(&range);
    info!(
        sheet = %first,
        headers = data.headers.len(),
        rows = data.rows.len(),
        "parsed input workbook"
    );
    Ok(data)
}

pub fn parse_input_file(path: &std::path::Path) -> SheetfillResult<InputData> {
    let bytes = std::fs::read(path)
        .map_err(|e| SheetfillError::Parse(format!("{}: {}", path.display(), e)))?;
    parse_input(&bytes)
}

fn rows_from_range(range: &Range<Data>) -> InputData {
    let Some((end_row, end_col)) = range.end() else {
        return InputData {
            headers: (1..=DEFAULT_HEADER_COUNT).map(default_header).collect(),
            rows: Vec::new(),
        };
    };

    let cell_text = |row: u32, col: u32| -> Option<String> {
        range
            .get_value((row, col))
            .and_then(data_to_value)
            .and_then(|v| v.display())
    };

    let header_cells: Vec<Option<String>> = (0..=end_col).map(|c| cell_text(0, c)).collect();
    let last_header = header_cells.iter().rposition(Option::is_some);
    let headers: Vec<String> = match last_header {
        Some(last) => header_cells[..=last]
            .iter()
            .enumerate()
            .map(|(i, h)| h.clone().unwrap_or_else(|| default_header(i as u32 + 1)))
            .collect(),
        None => (1..=DEFAULT_HEADER_COUNT).map(default_header).collect(),
    };

    let mut rows = Vec::new();
    for r in 1..=end_row {
        let mut row = DataRow::new();
        for c in 0..=end_col {
            if let Some(text) = cell_text(r, c) {
                let header = headers
                    .get(c as usize)
                    .cloned()
                    .unwrap_or_else(|| default_header(c + 1));
                row.insert(header, text);
            }
        }
        if row.is_empty() {
            debug!(row = r + 1, "skipping empty input row");
        } else {
            rows.push(row);
        }
    }

    InputData { headers, rows }
}

/// A worksheet of a workbook format the OOXML reader does not handle
/// (`.xls`, `.ods`). Values and, for `.xls`, merges; no styles.
pub struct CalamineSheet {
    name: String,
    range: Range<Data>,
    merges: Option<Vec<CellRange>>,
}

impl CalamineSheet {
    pub fn open(bytes: &[u8], sheet: Option<&str>) -> SheetfillResult<Self> {
        let mut workbook = open_any(bytes).map_err(|e| SheetfillError::Load(e.to_string()))?;
        let names = workbook.sheet_names();
        let name = match sheet {
            Some(wanted) => names
                .iter()
                .find(|n| n.as_str() == wanted)
                .cloned()
                .ok_or_else(|| SheetfillError::Load(format!("no worksheet named '{}'", wanted)))?,
            None => names
                .first()
                .cloned()
                .ok_or_else(|| SheetfillError::Load("workbook contains no worksheets".to_string()))?,
        };
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| SheetfillError::Load(format!("sheet '{}': {}", name, e)))?;
        let merges = match &workbook {
            Sheets::Xls(xls) => xls.worksheet_merge_cells(&name).map(|dims| {
                dims.iter()
                    .map(|d| {
                        CellRange::new(
                            CellAddress::new(d.start.0 + 1, d.start.1 + 1),
                            CellAddress::new(d.end.0 + 1, d.end.1 + 1),
                        )
                    })
                    .collect()
            }),
            _ => None,
        };
        Ok(Self { name, range, merges })
    }

    pub fn sheet_names(bytes: &[u8]) -> SheetfillResult<Vec<String>> {
        let workbook = open_any(bytes).map_err(|e| SheetfillError::Load(e.to_string()))?;
        Ok(workbook.sheet_names())
    }
}

impl Worksheet for CalamineSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_dimension(&self) -> Option<CellRange> {
        None
    }

    fn populated_cells(&self) -> Vec<CellAddress> {
        let (r0, c0) = self.range.start().unwrap_or((0, 0));
        self.range
            .used_cells()
            .map(|(r, c, _)| CellAddress::new(r0 + r as u32 + 1, c0 + c as u32 + 1))
            .collect()
    }

    fn cell(&self, at: CellAddress) -> Result<Option<SheetCell>, CellReadError> {
        Ok(self
            .range
            .get_value((at.row - 1, at.col - 1))
            .map(|data| SheetCell {
                value: data_to_value(data),
                style: None,
            }))
    }

    fn merged_regions(&self) -> Option<Vec<CellRange>> {
        self.merges.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn range_of(cells: &[((u32, u32), Data)]) -> Range<Data> {
        let max_r = cells.iter().map(|((r, _), _)| *r).max().unwrap_or(0);
        let max_c = cells.iter().map(|((_, c), _)| *c).max().unwrap_or(0);
        let mut range = Range::new((0, 0), (max_r, max_c));
        for ((r, c), v) in cells {
            range.set_value((*r, *c), v.clone());
        }
        range
    }

    #[test]
    fn test_headers_and_rows() {
        let range = range_of(&[
            ((0, 0), Data::String("Name".into())),
            ((0, 1), Data::String("Code".into())),
            ((1, 0), Data::String("Ada".into())),
            ((1, 1), Data::Float(7.0)),
            ((3, 1), Data::Int(9)),
        ]);
        let data = rows_from_range(&range);
        assert_eq!(data.headers, vec!["Name", "Code"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].get("Name"), Some("Ada"));
        assert_eq!(data.rows[0].get("Code"), Some("7"));
        assert_eq!(data.rows[1].get("Name"), None);
        assert_eq!(data.rows[1].get("Code"), Some("9"));
    }

    #[test]
    fn test_missing_header_cells_get_default_names() {
        let range = range_of(&[
            ((0, 1), Data::String("B".into())),
            ((1, 0), Data::String("x".into())),
            ((1, 2), Data::String("y".into())),
        ]);
        let data = rows_from_range(&range);
        assert_eq!(data.headers, vec!["Column 1", "B"]);
        assert_eq!(data.rows[0].get("Column 1"), Some("x"));
        assert_eq!(data.rows[0].get("Column 3"), Some("y"));
    }

    #[test]
    fn test_empty_header_row_gives_ten_defaults() {
        let range = range_of(&[((1, 0), Data::String("x".into()))]);
        let data = rows_from_range(&range);
        assert_eq!(data.headers.len(), 10);
        assert_eq!(data.headers[9], "Column 10");
    }

    #[test]
    fn test_data_to_value_renders_iso_and_errors() {
        assert_eq!(
            data_to_value(&Data::DateTimeIso("2024-02-29T10:00:00".into()))
                .unwrap()
                .render(),
            "2024-02-29"
        );
        assert_eq!(
            data_to_value(&Data::Error(calamine::CellErrorType::Div0))
                .unwrap()
                .render(),
            r##"{"error":"#DIV/0!"}"##
        );
        assert_eq!(data_to_value(&Data::Empty), None);
        assert_eq!(data_to_value(&Data::Bool(false)).unwrap().render(), "false");
    }

    #[test]
    fn test_parse_input_rejects_garbage() {
        assert!(matches!(
            parse_input(b"definitely not a workbook"),
            Err(SheetfillError::Parse(_))
        ));
    }
}
