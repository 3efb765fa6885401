//! Worksheet part reader (`xl/worksheets/sheetN.xml`)

use super::dates::serial_to_datetime;
use super::package::PackageError;
use super::strings::{SharedString, StringItemBuilder};
use super::styles::StyleSheet;
use super::xml::attr;
use crate::address::{to_indices, CellAddress, CellRange};
use crate::grid::{CellReadError, CellValue, RawMergeRange, ScalarValue, SheetCell, Worksheet};
use chrono::NaiveDateTime;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A `<c>` element as stored, before its value is interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCell {
    pub style: Option<usize>,
    pub kind: Option<String>,
    pub value: Option<String>,
    pub formula: Option<String>,
    pub inline: Option<SharedString>,
}

impl RawCell {
    fn is_populated(&self) -> bool {
        self.value.is_some() || self.inline.is_some() || self.formula.is_some()
    }
}

/// Workbook-level data every sheet needs to interpret its cells.
#[derive(Debug, Clone, Default)]
pub struct SheetContext {
    pub shared_strings: Vec<SharedString>,
    pub styles: StyleSheet,
    pub date1904: bool,
}

#[derive(Debug, Clone)]
pub struct OoxmlSheet {
    name: String,
    dimension: Option<String>,
    cells: BTreeMap<CellAddress, RawCell>,
    merge_refs: Vec<String>,
    row_heights: HashMap<u32, f64>,
    context: Arc<SheetContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Value,
    Formula,
}

impl OoxmlSheet {
    pub fn parse(
        name: &str,
        part: &str,
        xml: &[u8],
        context: Arc<SheetContext>,
    ) -> Result<Self, PackageError> {
        let mut sheet = OoxmlSheet {
            name: name.to_string(),
            dimension: None,
            cells: BTreeMap::new(),
            merge_refs: Vec::new(),
            row_heights: HashMap::new(),
            context,
        };

        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut row = 0u32;
        let mut col = 0u32;
        let mut cell: Option<(CellAddress, RawCell)> = None;
        let mut inline: Option<StringItemBuilder> = None;
        let mut capture = Capture::None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| PackageError::xml(part, e))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let empty = matches!(event, Event::Empty(_));
                    let local = e.local_name();
                    match local.as_ref() {
                        b"dimension" => sheet.dimension = attr(e, b"ref"),
                        b"mergeCell" => sheet.merge_refs.extend(attr(e, b"ref")),
                        b"row" => {
                            row = attr(e, b"r")
                                .and_then(|r| r.parse().ok())
                                .unwrap_or(row + 1);
                            col = 0;
                            if let Some(ht) = attr(e, b"ht").and_then(|h| h.parse().ok()) {
                                sheet.row_heights.insert(row, ht);
                            }
                        }
                        b"c" => {
                            let at = match attr(e, b"r").and_then(|r| to_indices(&r).ok()) {
                                Some((r, c)) => CellAddress::new(r, c),
                                None => CellAddress::new(row.max(1), col + 1),
                            };
                            col = at.col;
                            let raw = RawCell {
                                style: attr(e, b"s").and_then(|s| s.parse().ok()),
                                kind: attr(e, b"t"),
                                ..Default::default()
                            };
                            if empty {
                                sheet.cells.insert(at, raw);
                            } else {
                                cell = Some((at, raw));
                            }
                        }
                        b"v" if cell.is_some() => {
                            if let Some((_, raw)) = cell.as_mut() {
                                raw.value = Some(String::new());
                            }
                            if !empty {
                                capture = Capture::Value;
                            }
                        }
                        b"f" if cell.is_some() => {
                            if let Some((_, raw)) = cell.as_mut() {
                                raw.formula = Some(String::new());
                            }
                            if !empty {
                                capture = Capture::Formula;
                            }
                        }
                        b"is" if cell.is_some() && !empty => {
                            inline = Some(StringItemBuilder::default());
                        }
                        other => {
                            if !empty {
                                if let Some(b) = inline.as_mut() {
                                    b.open(other);
                                }
                            }
                        }
                    }
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"v" | b"f" => capture = Capture::None,
                    b"is" => {
                        if let (Some(b), Some((_, raw))) = (inline.take(), cell.as_mut()) {
                            raw.inline = Some(b.finish());
                        }
                    }
                    b"c" => {
                        if let Some((at, raw)) = cell.take() {
                            sheet.cells.insert(at, raw);
                        }
                    }
                    other => {
                        if let Some(b) = inline.as_mut() {
                            b.close(other);
                        }
                    }
                },
                Event::Text(ref t) => {
                    let text = t.unescape().map_err(|e| PackageError::xml(part, e))?;
                    if let Some(b) = inline.as_mut() {
                        b.text(&text);
                    } else if let Some((_, raw)) = cell.as_mut() {
                        match capture {
                            Capture::Value => raw.value.get_or_insert_with(String::new).push_str(&text),
                            Capture::Formula => raw.formula.get_or_insert_with(String::new).push_str(&text),
                            Capture::None => {}
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(sheet)
    }

    pub fn raw_cell(&self, at: CellAddress) -> Option<&RawCell> {
        self.cells.get(&at)
    }

    fn resolve(&self, raw: &RawCell) -> Result<Option<CellValue>, CellReadError> {
        let ctx = &self.context;
        let value = raw.value.as_deref();

        let resolved = match raw.kind.as_deref() {
            Some("s") => match value {
                Some(v) => {
                    let idx: usize = v
                        .trim()
                        .parse()
                        .map_err(|_| CellReadError(format!("bad shared string index '{}'", v)))?;
                    let item = ctx.shared_strings.get(idx).ok_or_else(|| {
                        CellReadError(format!("shared string {} out of range", idx))
                    })?;
                    Some(item.to_value())
                }
                None => None,
            },
            Some("inlineStr") => raw.inline.as_ref().map(SharedString::to_value),
            Some("str") => value.map(CellValue::text),
            Some("b") => match value.map(str::trim) {
                Some("1") | Some("true") => Some(CellValue::Scalar(ScalarValue::Bool(true))),
                Some("0") | Some("false") => Some(CellValue::Scalar(ScalarValue::Bool(false))),
                Some(other) => return Err(CellReadError(format!("bad boolean '{}'", other))),
                None => None,
            },
            Some("e") => value.map(|v| CellValue::Other(json!({ "error": v }))),
            Some("d") => match value {
                Some(v) => Some(CellValue::DateValue(parse_iso_datetime(v).ok_or_else(
                    || CellReadError(format!("bad ISO date '{}'", v)),
                )?)),
                None => None,
            },
            None | Some("n") => match value {
                Some(v) => {
                    let n: f64 = v
                        .trim()
                        .parse()
                        .map_err(|_| CellReadError(format!("bad number '{}'", v)))?;
                    let is_date = raw.style.is_some_and(|s| ctx.styles.is_date(s));
                    match serial_to_datetime(n, ctx.date1904).filter(|_| is_date) {
                        Some(dt) => Some(CellValue::DateValue(dt)),
                        None => Some(CellValue::number(n)),
                    }
                }
                None => raw.inline.as_ref().map(SharedString::to_value),
            },
            Some(other) => value.map(|v| CellValue::Other(json!({ "type": other, "value": v }))),
        };

        Ok(match (resolved, &raw.formula) {
            (None, Some(f)) if !f.is_empty() => Some(CellValue::Other(json!({ "formula": f }))),
            (resolved, _) => resolved,
        })
    }
}

fn parse_iso_datetime(v: &str) -> Option<NaiveDateTime> {
    let v = v.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(v.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    chrono::NaiveDate::parse_from_str(v.get(..10)?, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

fn split_merge_ref(reference: &str) -> RawMergeRange {
    let (a, b) = reference.split_once(':').unwrap_or((reference, reference));
    let start = to_indices(a).ok();
    let end = to_indices(b).ok();
    RawMergeRange {
        top: start.map(|(r, _)| r),
        left: start.map(|(_, c)| c),
        bottom: end.map(|(r, _)| r),
        right: end.map(|(_, c)| c),
    }
}

impl Worksheet for OoxmlSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_dimension(&self) -> Option<CellRange> {
        self.dimension.as_deref()?.parse().ok()
    }

    fn populated_cells(&self) -> Vec<CellAddress> {
        self.cells
            .iter()
            .filter(|(_, raw)| raw.is_populated())
            .map(|(at, _)| *at)
            .collect()
    }

    fn cell(&self, at: CellAddress) -> Result<Option<SheetCell>, CellReadError> {
        let Some(raw) = self.cells.get(&at) else {
            return Ok(None);
        };
        let value = self.resolve(raw)?;
        let style = self.context.styles.projection(raw.style.unwrap_or(0));
        Ok(Some(SheetCell {
            value,
            style: Some(style),
        }))
    }

    /// All-or-nothing: one unparsable reference hands over to the merge table.
    fn merged_regions(&self) -> Option<Vec<CellRange>> {
        self.merge_refs.iter().map(|r| r.parse().ok()).collect()
    }

    fn merge_table(&self) -> Option<Vec<RawMergeRange>> {
        Some(self.merge_refs.iter().map(|r| split_merge_ref(r)).collect())
    }

    fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }
}
