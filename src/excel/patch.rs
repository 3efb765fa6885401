//! In-place cell writes on a worksheet part
//!
//! The part is streamed event by event and written back unchanged except for
//! the targeted cells, so unknown elements and extension nodes survive.
//! A written cell keeps its `s` (style) attribute and becomes an inline string.
//! Missing rows and cells are created in sorted position.
//!
//! Overwriting the master cell of a shared formula would orphan the rest of
//! its group, so every other cell of that group gets its own formula first.

use super::formula::shift_formula;
use super::package::PackageError;
use super::xml::{attr, xml_safe};
use crate::address::{to_indices, CellAddress, CellRange};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type RowWrites<'a> = BTreeMap<u32, &'a str>;

struct Patcher<'a> {
    part: &'a str,
    writer: Writer<Vec<u8>>,
    /// Namespace prefix used by the sheet's elements, e.g. `x:`.
    prefix: String,
}

impl<'a> Patcher<'a> {
    fn emit(&mut self, event: Event<'_>) -> Result<(), PackageError> {
        let part = self.part;
        self.writer
            .write_event(event)
            .map_err(|e| PackageError::xml(part, e))
    }

    fn tag(&self, local: &str) -> String {
        format!("{}{}", self.prefix, local)
    }

    fn write_cell(&mut self, at: CellAddress, style: Option<&str>, value: &str) -> Result<(), PackageError> {
        let address = at.to_string();
        let mut c = BytesStart::new(self.tag("c"));
        c.push_attribute(("r", address.as_str()));
        if let Some(s) = style {
            c.push_attribute(("s", s));
        }
        c.push_attribute(("t", "inlineStr"));
        let is = self.tag("is");
        let t_name = self.tag("t");
        let mut t = BytesStart::new(t_name.clone());
        t.push_attribute(("xml:space", "preserve"));
        let text = xml_safe(value);

        self.emit(Event::Start(c))?;
        self.emit(Event::Start(BytesStart::new(is.clone())))?;
        self.emit(Event::Start(t))?;
        self.emit(Event::Text(BytesText::new(&text)))?;
        self.emit(Event::End(BytesEnd::new(t_name)))?;
        self.emit(Event::End(BytesEnd::new(is)))?;
        self.emit(Event::End(BytesEnd::new(self.tag("c"))))
    }

    fn write_cells(&mut self, row: u32, cells: RowWrites<'_>) -> Result<(), PackageError> {
        for (col, value) in cells {
            self.write_cell(CellAddress::new(row, col), None, value)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: u32, cells: RowWrites<'_>) -> Result<(), PackageError> {
        let mut start = BytesStart::new(self.tag("row"));
        let r = row.to_string();
        start.push_attribute(("r", r.as_str()));
        self.emit(Event::Start(start))?;
        self.write_cells(row, cells)?;
        self.emit(Event::End(BytesEnd::new(self.tag("row"))))
    }
}

/// Pending rows strictly before `row` (all of them when `row` is `None`).
fn take_rows_before<'a>(
    pending: &mut BTreeMap<u32, RowWrites<'a>>,
    row: Option<u32>,
) -> Vec<(u32, RowWrites<'a>)> {
    let keep = match row {
        Some(r) => pending.split_off(&r),
        None => BTreeMap::new(),
    };
    std::mem::replace(pending, keep).into_iter().collect()
}

fn take_cells_before<'a>(cells: &mut RowWrites<'a>, col: u32) -> RowWrites<'a> {
    let keep = cells.split_off(&col);
    std::mem::replace(cells, keep)
}

/// Copy of the row start tag without `spans`, which would no longer be accurate.
fn without_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    for a in e.attributes().flatten() {
        if a.key.local_name().as_ref() != b"spans" {
            start.push_attribute(a);
        }
    }
    start.into_owned()
}

/// `<dimension>` grown to cover every written cell. Unparseable refs are kept.
fn grown_dimension(e: &BytesStart<'_>, writes: &BTreeMap<CellAddress, String>) -> Option<BytesStart<'static>> {
    let declared: CellRange = attr(e, b"ref")?.parse().ok()?;
    let mut start = declared.start;
    let mut end = declared.end;
    for at in writes.keys() {
        start = CellAddress::new(start.row.min(at.row), start.col.min(at.col));
        end = CellAddress::new(end.row.max(at.row), end.col.max(at.col));
    }
    let grown = CellRange::new(start, end);
    if grown == declared {
        return None;
    }

    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let reference = grown.to_string();
    let mut out = BytesStart::new(name);
    for a in e.attributes().flatten() {
        if a.key.local_name().as_ref() == b"ref" {
            out.push_attribute(("ref", reference.as_str()));
        } else {
            out.push_attribute(a);
        }
    }
    Some(out.into_owned())
}

/// A patched worksheet part.
#[derive(Debug, Clone, Default)]
pub struct PatchedSheet {
    pub xml: Vec<u8>,
    /// Written cells that held a formula in the template.
    pub replaced_formulas: Vec<CellAddress>,
}

/// Shared formula master: its cell and formula text.
#[derive(Debug, Clone)]
struct SharedMaster {
    at: CellAddress,
    text: String,
}

#[derive(Debug, Default)]
struct FormulaScan {
    cells: BTreeSet<CellAddress>,
    /// Keyed by `si`.
    masters: HashMap<String, SharedMaster>,
}

fn is_shared(f: &BytesStart<'_>) -> bool {
    attr(f, b"t").as_deref() == Some("shared")
}

/// Formula cells and shared formula masters of a worksheet part.
fn scan_formulas(part: &str, xml: &[u8]) -> Result<FormulaScan, PackageError> {
    let mut scan = FormulaScan::default();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut row = 0u32;
    let mut col = 0u32;
    let mut cell: Option<CellAddress> = None;
    let mut master: Option<(String, SharedMaster)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PackageError::xml(part, e))?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"row" => {
                        row = attr(e, b"r").and_then(|r| r.parse().ok()).unwrap_or(row + 1);
                        col = 0;
                    }
                    b"c" => {
                        let at = match attr(e, b"r").and_then(|r| to_indices(&r).ok()) {
                            Some((r, c)) => CellAddress::new(r, c),
                            None => CellAddress::new(row.max(1), col + 1),
                        };
                        col = at.col;
                        cell = (!empty).then_some(at);
                    }
                    b"f" => {
                        if let Some(at) = cell {
                            scan.cells.insert(at);
                            let defines_group = !empty && is_shared(e) && attr(e, b"ref").is_some();
                            if let Some(si) = attr(e, b"si").filter(|_| defines_group) {
                                master = Some((si, SharedMaster { at, text: String::new() }));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                if let Some((_, m)) = master.as_mut() {
                    m.text.push_str(&t.unescape().map_err(|e| PackageError::xml(part, e))?);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"f" => {
                    if let Some((si, m)) = master.take() {
                        if !m.text.is_empty() {
                            scan.masters.insert(si, m);
                        }
                    }
                }
                b"c" => cell = None,
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(scan)
}

pub fn apply_cell_writes(
    part: &str,
    xml: &[u8],
    writes: &BTreeMap<CellAddress, String>,
) -> Result<PatchedSheet, PackageError> {
    if writes.is_empty() {
        return Ok(PatchedSheet {
            xml: xml.to_vec(),
            replaced_formulas: Vec::new(),
        });
    }

    let scan = scan_formulas(part, xml)?;
    let replaced_formulas: Vec<CellAddress> = writes
        .keys()
        .filter(|at| scan.cells.contains(*at))
        .copied()
        .collect();
    // Groups whose master is overwritten; their other cells get standalone formulas.
    let orphaned: HashMap<String, SharedMaster> = scan
        .masters
        .into_iter()
        .filter(|(_, m)| writes.contains_key(&m.at))
        .collect();

    let mut pending: BTreeMap<u32, RowWrites<'_>> = BTreeMap::new();
    for (at, value) in writes {
        pending.entry(at.row).or_default().insert(at.col, value.as_str());
    }

    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Patcher {
        part,
        writer: Writer::new(Vec::with_capacity(xml.len() + 512)),
        prefix: String::new(),
    };

    let mut in_sheet_data = false;
    let mut seen_sheet_data = false;
    let mut last_row = 0u32;
    let mut last_col = 0u32;
    let mut row_writes: Option<RowWrites<'_>> = None;
    let mut skipping = false;
    let mut skipping_formula = false;
    let mut open_cell: Option<CellAddress> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PackageError::xml(part, e))?;

        if skipping || skipping_formula {
            if let Event::End(e) = &event {
                match e.local_name().as_ref() {
                    b"c" if skipping => skipping = false,
                    b"f" if skipping_formula => skipping_formula = false,
                    _ => {}
                }
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,

            Event::Empty(e) if !seen_sheet_data && e.local_name().as_ref() == b"dimension" => {
                match grown_dimension(&e, writes) {
                    Some(grown) => out.emit(Event::Empty(grown))?,
                    None => out.emit(Event::Empty(e))?,
                }
            }

            Event::Start(e) if !in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                out.prefix = prefix_of(&e);
                in_sheet_data = true;
                seen_sheet_data = true;
                out.emit(Event::Start(e))?;
            }
            Event::Empty(e) if !in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                out.prefix = prefix_of(&e);
                seen_sheet_data = true;
                let end = e.to_end().into_owned();
                out.emit(Event::Start(e))?;
                for (row, cells) in take_rows_before(&mut pending, None) {
                    out.write_row(row, cells)?;
                }
                out.emit(Event::End(end))?;
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"sheetData" => {
                for (row, cells) in take_rows_before(&mut pending, None) {
                    out.write_row(row, cells)?;
                }
                in_sheet_data = false;
                out.emit(Event::End(e))?;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = attr(&e, b"r")
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(last_row + 1);
                for (r, cells) in take_rows_before(&mut pending, Some(row)) {
                    out.write_row(r, cells)?;
                }
                last_row = row;
                last_col = 0;
                row_writes = pending.remove(&row);
                if row_writes.is_some() {
                    out.emit(Event::Start(without_spans(&e)))?;
                } else {
                    out.emit(Event::Start(e))?;
                }
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = attr(&e, b"r")
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(last_row + 1);
                for (r, cells) in take_rows_before(&mut pending, Some(row)) {
                    out.write_row(r, cells)?;
                }
                last_row = row;
                match pending.remove(&row) {
                    Some(cells) => {
                        let start = without_spans(&e);
                        let end = start.to_end().into_owned();
                        out.emit(Event::Start(start))?;
                        out.write_cells(row, cells)?;
                        out.emit(Event::End(end))?;
                    }
                    None => out.emit(Event::Empty(e))?,
                }
            }
            Event::End(e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some(cells) = row_writes.take() {
                    out.write_cells(last_row, cells)?;
                }
                out.emit(Event::End(e))?;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                skipping = patch_cell(&mut out, e, true, &mut row_writes, last_row, &mut last_col)?;
                open_cell = (!skipping).then(|| CellAddress::new(last_row, last_col));
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                patch_cell(&mut out, e, false, &mut row_writes, last_row, &mut last_col)?;
            }
            Event::End(e) if open_cell.is_some() && e.local_name().as_ref() == b"c" => {
                open_cell = None;
                out.emit(Event::End(e))?;
            }

            Event::Start(e) if open_cell.is_some() && e.local_name().as_ref() == b"f" => {
                skipping_formula = patch_formula(&mut out, e, true, open_cell, &orphaned)?;
            }
            Event::Empty(e) if open_cell.is_some() && e.local_name().as_ref() == b"f" => {
                patch_formula(&mut out, e, false, open_cell, &orphaned)?;
            }

            other => out.emit(other)?,
        }
        buf.clear();
    }

    if !seen_sheet_data {
        return Err(PackageError::xml(part, "worksheet has no sheetData element"));
    }

    Ok(PatchedSheet {
        xml: out.writer.into_inner(),
        replaced_formulas,
    })
}

/// Emit one `<c>` element, replacing it when the current row has a write for
/// its column. Returns `true` when the original element's children must be skipped.
fn patch_cell(
    out: &mut Patcher<'_>,
    e: BytesStart<'_>,
    is_start: bool,
    row_writes: &mut Option<RowWrites<'_>>,
    row: u32,
    last_col: &mut u32,
) -> Result<bool, PackageError> {
    let col = attr(&e, b"r")
        .and_then(|r| to_indices(&r).ok())
        .map(|(_, c)| c)
        .unwrap_or(*last_col + 1);
    *last_col = col;

    let original = |e| if is_start { Event::Start(e) } else { Event::Empty(e) };
    let Some(cells) = row_writes.as_mut() else {
        out.emit(original(e))?;
        return Ok(false);
    };

    let before = take_cells_before(cells, col);
    out.write_cells(row, before)?;
    match cells.remove(&col) {
        Some(value) => {
            let style = attr(&e, b"s");
            out.write_cell(CellAddress::new(row, col), style.as_deref(), value)?;
            Ok(is_start)
        }
        None => {
            out.emit(original(e))?;
            Ok(false)
        }
    }
}

/// Emit one `<f>` element, giving a shared formula follower of an orphaned
/// group its own shifted formula. Returns `true` when the original element's
/// children must be skipped.
fn patch_formula(
    out: &mut Patcher<'_>,
    e: BytesStart<'_>,
    is_start: bool,
    cell: Option<CellAddress>,
    orphaned: &HashMap<String, SharedMaster>,
) -> Result<bool, PackageError> {
    let master = match (cell, attr(&e, b"si")) {
        (Some(at), Some(si)) if is_shared(&e) => orphaned.get(&si).map(|m| (at, m)),
        _ => None,
    };
    let Some((at, master)) = master else {
        out.emit(if is_start { Event::Start(e) } else { Event::Empty(e) })?;
        return Ok(false);
    };

    let rows = at.row as i64 - master.at.row as i64;
    let cols = at.col as i64 - master.at.col as i64;
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let text = shift_formula(&master.text, rows, cols);
    out.emit(Event::Start(BytesStart::new(tag.clone())))?;
    out.emit(Event::Text(BytesText::new(&text)))?;
    out.emit(Event::End(BytesEnd::new(tag)))?;
    Ok(is_start)
}

fn prefix_of(e: &BytesStart<'_>) -> String {
    match e.name().prefix() {
        Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
        None => String::new(),
    }
}
