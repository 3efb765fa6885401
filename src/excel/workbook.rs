//! OOXML workbook: sheet discovery, cell writes, re-serialization

use super::package::{part_dir, rels_part_for, resolve_target, Package, PackageError};
use super::patch::apply_cell_writes;
use super::recalc::{
    remove_calc_chain_override, remove_calc_chain_relationship, CALC_CHAIN_REL, CONTENT_TYPES_PART,
};
use super::sheet::{OoxmlSheet, SheetContext};
use super::strings::parse_shared_strings;
use super::styles::StyleSheet;
use super::xml::attr;
use crate::address::CellAddress;
use crate::error::{SheetfillError, SheetfillResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";
const WORKSHEET_REL: &str = "/worksheet";
const SHARED_STRINGS_REL: &str = "/sharedStrings";
const STYLES_REL: &str = "/styles";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub part: String,
}

#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    target: String,
    kind: String,
}

fn load_err(err: PackageError) -> SheetfillError {
    SheetfillError::Load(err.to_string())
}

fn parse_relationships(part: &str, xml: &[u8]) -> Result<Vec<Relationship>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| PackageError::xml(part, e))?
        {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.push(Relationship {
                        id,
                        target,
                        kind: attr(&e, b"Type").unwrap_or_default(),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// `(sheet name, relationship id)` pairs in workbook order, plus the 1904 flag.
fn parse_workbook(part: &str, xml: &[u8]) -> Result<(Vec<(String, String)>, bool), PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut date1904 = false;
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| PackageError::xml(part, e))?
        {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    if let (Some(name), Some(id)) = (attr(&e, b"name"), attr(&e, b"id")) {
                        sheets.push((name, id));
                    }
                }
                b"workbookPr" => {
                    date1904 = matches!(attr(&e, b"date1904").as_deref(), Some("1" | "true"));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((sheets, date1904))
}

/// A parsed template workbook.
///
/// Opening is cheap (package index, workbook and relationship parts); sheet
/// content, shared strings and styles are only read when a worksheet is
/// requested. Cell writes are buffered and applied on [`to_bytes`].
///
/// [`to_bytes`]: TemplateWorkbook::to_bytes
#[derive(Debug, Clone)]
pub struct TemplateWorkbook {
    package: Package,
    workbook_part: String,
    sheets: Vec<SheetEntry>,
    shared_strings_part: Option<String>,
    styles_part: Option<String>,
    calc_chain_part: Option<String>,
    date1904: bool,
    writes: BTreeMap<usize, BTreeMap<CellAddress, String>>,
}

impl TemplateWorkbook {
    pub fn open(bytes: Arc<[u8]>) -> SheetfillResult<Self> {
        let package = Package::open(bytes).map_err(load_err)?;

        let root_rels = match package.read_part("_rels/.rels").map_err(load_err)? {
            Some(xml) => parse_relationships("_rels/.rels", &xml).map_err(load_err)?,
            None => Vec::new(),
        };
        let workbook_part = root_rels
            .iter()
            .find(|r| r.kind.ends_with(OFFICE_DOCUMENT_REL))
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| "xl/workbook.xml".to_string());

        let workbook_xml = package.require_part(&workbook_part).map_err(load_err)?;
        let (declared, date1904) = parse_workbook(&workbook_part, &workbook_xml).map_err(load_err)?;

        let rels_part = rels_part_for(&workbook_part);
        let rels = match package.read_part(&rels_part).map_err(load_err)? {
            Some(xml) => parse_relationships(&rels_part, &xml).map_err(load_err)?,
            None => Vec::new(),
        };
        let by_id: HashMap<&str, &Relationship> = rels.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut sheets = Vec::new();
        for (name, id) in declared {
            match by_id.get(id.as_str()) {
                Some(rel) if rel.kind.ends_with(WORKSHEET_REL) => {
                    let part = resolve_target(&workbook_part, &rel.target);
                    if !package.has_part(&part) {
                        return Err(SheetfillError::Load(format!(
                            "worksheet '{}' points to missing part {}",
                            name, part
                        )));
                    }
                    sheets.push(SheetEntry { name, part });
                }
                Some(rel) => debug!(sheet = %name, kind = %rel.kind, "skipping non-worksheet sheet"),
                None => {
                    return Err(SheetfillError::Load(format!(
                        "sheet '{}' has no relationship {}",
                        name, id
                    )))
                }
            }
        }

        if sheets.is_empty() {
            return Err(SheetfillError::Load("workbook contains no worksheets".to_string()));
        }

        let find_part = |suffix: &str| {
            rels.iter()
                .find(|r| r.kind.ends_with(suffix))
                .map(|r| resolve_target(&workbook_part, &r.target))
        };
        let shared_strings_part = find_part(SHARED_STRINGS_REL);
        let styles_part = find_part(STYLES_REL);
        let calc_chain_part = find_part(CALC_CHAIN_REL).or_else(|| {
            let fallback = format!("{}calcChain.xml", part_dir(&workbook_part));
            package.has_part(&fallback).then_some(fallback)
        });

        Ok(Self {
            package,
            workbook_part,
            sheets,
            shared_strings_part,
            styles_part,
            calc_chain_part,
            date1904,
            writes: BTreeMap::new(),
        })
    }

    pub fn workbook_part(&self) -> &str {
        &self.workbook_part
    }

    pub fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Index of the named sheet, or of the first sheet when `name` is `None`.
    pub fn sheet_index(&self, name: Option<&str>) -> SheetfillResult<usize> {
        match name {
            None => Ok(0),
            Some(name) => self
                .sheets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| SheetfillError::Load(format!("no worksheet named '{}'", name))),
        }
    }

    fn context(&self) -> SheetfillResult<SheetContext> {
        let shared_strings = match &self.shared_strings_part {
            Some(part) => match self.package.read_part(part).map_err(load_err)? {
                Some(xml) => parse_shared_strings(&xml).map_err(load_err)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        // Unreadable styles only cost the grid its styling.
        let styles = match &self.styles_part {
            Some(part) => match self.package.read_part(part) {
                Ok(Some(xml)) => StyleSheet::parse(&xml).unwrap_or_else(|err| {
                    debug!(error = %err, "ignoring unreadable styles part");
                    StyleSheet::default()
                }),
                _ => StyleSheet::default(),
            },
            None => StyleSheet::default(),
        };
        Ok(SheetContext {
            shared_strings,
            styles,
            date1904: self.date1904,
        })
    }

    pub fn worksheet(&self, index: usize) -> SheetfillResult<OoxmlSheet> {
        let entry = self
            .sheets
            .get(index)
            .ok_or_else(|| SheetfillError::Load(format!("no worksheet at index {}", index)))?;
        let context = Arc::new(self.context()?);
        let xml = self.package.require_part(&entry.part).map_err(load_err)?;
        OoxmlSheet::parse(&entry.name, &entry.part, &xml, context).map_err(load_err)
    }

    /// Queue a string value for a cell. The address is validated now; the
    /// sheet part is only rewritten by [`to_bytes`](Self::to_bytes).
    pub fn set_cell_value(&mut self, sheet: usize, address: &str, value: &str) -> SheetfillResult<()> {
        if sheet >= self.sheets.len() {
            return Err(SheetfillError::Load(format!("no worksheet at index {}", sheet)));
        }
        let at: CellAddress = address.parse()?;
        self.writes
            .entry(sheet)
            .or_default()
            .insert(at, value.to_string());
        Ok(())
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.values().map(BTreeMap::len).sum()
    }

    /// Serialize the workbook with every queued write applied.
    ///
    /// When a write replaces a formula cell, the calculation chain is dropped
    /// along with its relationship and content-type override.
    pub fn to_bytes(&self) -> SheetfillResult<Vec<u8>> {
        let mut replacements = HashMap::new();
        let mut replaced_formulas = 0;
        for (index, writes) in &self.writes {
            let entry = &self.sheets[*index];
            let xml = self.package.require_part(&entry.part).map_err(load_err)?;
            let patched = apply_cell_writes(&entry.part, &xml, writes).map_err(load_err)?;
            replaced_formulas += patched.replaced_formulas.len();
            replacements.insert(entry.part.clone(), patched.xml);
        }

        let mut removals = Vec::new();
        if let Some(chain) = self.calc_chain_part.as_ref().filter(|_| replaced_formulas > 0) {
            debug!(part = %chain, formulas = replaced_formulas, "dropping calculation chain");
            self.without_calc_chain(&mut replacements).map_err(load_err)?;
            removals.push(chain.clone());
        }
        self.package.rewrite(&replacements, &removals).map_err(load_err)
    }

    fn without_calc_chain(&self, replacements: &mut HashMap<String, Vec<u8>>) -> Result<(), PackageError> {
        let rels_part = rels_part_for(&self.workbook_part);
        if let Some(rels) = self.package.read_part(&rels_part)? {
            let rels = remove_calc_chain_relationship(&rels_part, &rels)?;
            replacements.insert(rels_part, rels);
        }
        if let Some(types) = self.package.read_part(CONTENT_TYPES_PART)? {
            replacements.insert(CONTENT_TYPES_PART.to_string(), remove_calc_chain_override(&types)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::package::tests::zip_of;
    use crate::grid::{extract_grid, Worksheet};
    use pretty_assertions::assert_eq;

    const ROOT_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr date1904="1"/><sheets><sheet name="Form" sheetId="1" r:id="rId1"/><sheet name="Chart" sheetId="2" r:id="rId2"/><sheet name="Notes" sheetId="3" r:id="rId4"/></sheets></workbook>"#;
    const WORKBOOK_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/></Relationships>"#;
    const SHEET1: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:B2"/><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c></row><row r="2"><c r="B2" s="1"/></row></sheetData></worksheet>"#;
    const SHEET2: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;
    const STRINGS: &str = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><si><t>Name:</t></si></sst>"#;

    fn workbook_bytes() -> Arc<[u8]> {
        zip_of(&[
            ("_rels/.rels", ROOT_RELS),
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
            ("xl/chartsheets/sheet1.xml", "<chartsheet/>"),
            ("xl/sharedStrings.xml", STRINGS),
        ])
    }

    #[test]
    fn test_open_lists_worksheets_only() {
        let wb = TemplateWorkbook::open(workbook_bytes()).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Form", "Notes"]);
        assert_eq!(wb.sheets()[1].part, "xl/worksheets/sheet2.xml");
        assert_eq!(wb.workbook_part(), "xl/workbook.xml");
        assert_eq!(wb.sheet_index(None).unwrap(), 0);
        assert_eq!(wb.sheet_index(Some("Notes")).unwrap(), 1);
        assert!(matches!(wb.sheet_index(Some("Nope")), Err(SheetfillError::Load(_))));
    }

    #[test]
    fn test_worksheet_resolves_shared_strings() {
        let wb = TemplateWorkbook::open(workbook_bytes()).unwrap();
        let grid = extract_grid(&wb.worksheet(0).unwrap());
        assert_eq!(grid.sheet_name, "Form");
        assert_eq!(grid.cell("A1").unwrap().value.as_deref(), Some("Name:"));
    }

    #[test]
    fn test_writes_are_applied_on_serialize_only() {
        let mut wb = TemplateWorkbook::open(workbook_bytes()).unwrap();
        wb.set_cell_value(0, "B2", "Ada").unwrap();
        wb.set_cell_value(0, "C5", "new").unwrap();
        assert_eq!(wb.pending_writes(), 2);
        assert_eq!(wb.worksheet(0).unwrap().cell("B2".parse().unwrap()).unwrap().unwrap().value, None);

        let reopened = TemplateWorkbook::open(Arc::from(wb.to_bytes().unwrap())).unwrap();
        let sheet = reopened.worksheet(0).unwrap();
        let grid = extract_grid(&sheet);
        assert_eq!(grid.cell("B2").unwrap().value.as_deref(), Some("Ada"));
        assert_eq!(grid.cell("C5").unwrap().value.as_deref(), Some("new"));
        assert_eq!(sheet.raw_cell("B2".parse().unwrap()).unwrap().style, Some(1));
        assert_eq!(reopened.sheet_names(), vec!["Form", "Notes"]);
    }

    #[test]
    fn test_invalid_address_is_rejected_up_front() {
        let mut wb = TemplateWorkbook::open(workbook_bytes()).unwrap();
        assert!(matches!(
            wb.set_cell_value(0, "AB", "x"),
            Err(SheetfillError::InvalidAddress(_))
        ));
        assert!(matches!(wb.set_cell_value(9, "A1", "x"), Err(SheetfillError::Load(_))));
        assert_eq!(wb.pending_writes(), 0);
    }

    #[test]
    fn test_zero_worksheets_is_a_load_error() {
        let bytes = zip_of(&[
            ("_rels/.rels", ROOT_RELS),
            ("xl/workbook.xml", r#"<workbook><sheets/></workbook>"#),
        ]);
        match TemplateWorkbook::open(bytes) {
            Err(SheetfillError::Load(msg)) => assert!(msg.contains("no worksheets")),
            other => panic!("expected load error, got {:?}", other.map(|w| w.sheet_names())),
        }
    }

    const CALC_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;
    const CALC_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#;
    const CALC_SHEET: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1"><v>2</v></c><c r="B1"><f>A1*2</f><v>4</v></c></row></sheetData></worksheet>"#;

    fn formula_workbook() -> Arc<[u8]> {
        zip_of(&[
            ("[Content_Types].xml", CALC_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("xl/workbook.xml", r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Calc" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
            ("xl/_rels/workbook.xml.rels", CALC_RELS),
            ("xl/worksheets/sheet1.xml", CALC_SHEET),
            ("xl/calcChain.xml", r#"<calcChain><c r="B1" i="1"/></calcChain>"#),
        ])
    }

    fn part_text(bytes: &[u8], name: &str) -> Option<String> {
        let package = Package::open(Arc::from(bytes)).unwrap();
        package
            .read_part(name)
            .unwrap()
            .map(|b| String::from_utf8(b).unwrap())
    }

    #[test]
    fn test_overwriting_formula_drops_calc_chain() {
        let mut wb = TemplateWorkbook::open(formula_workbook()).unwrap();
        wb.set_cell_value(0, "B1", "fixed").unwrap();
        let out = wb.to_bytes().unwrap();

        assert_eq!(part_text(&out, "xl/calcChain.xml"), None);
        let rels = part_text(&out, "xl/_rels/workbook.xml.rels").unwrap();
        assert!(!rels.contains("calcChain"));
        assert!(rels.contains("worksheets/sheet1.xml"));
        let types = part_text(&out, "[Content_Types].xml").unwrap();
        assert!(!types.contains("calcChain"));
        assert!(types.contains("/xl/workbook.xml"));

        let reopened = TemplateWorkbook::open(Arc::from(out)).unwrap();
        let grid = extract_grid(&reopened.worksheet(0).unwrap());
        assert_eq!(grid.cell("B1").unwrap().value.as_deref(), Some("fixed"));
    }

    #[test]
    fn test_value_writes_keep_calc_chain() {
        let mut wb = TemplateWorkbook::open(formula_workbook()).unwrap();
        wb.set_cell_value(0, "A1", "3").unwrap();
        let out = wb.to_bytes().unwrap();

        assert!(part_text(&out, "xl/calcChain.xml").is_some());
        assert!(part_text(&out, "xl/_rels/workbook.xml.rels").unwrap().contains("calcChain"));
    }

    #[test]
    fn test_not_a_zip_is_a_load_error() {
        assert!(matches!(
            TemplateWorkbook::open(Arc::from(b"plain text".to_vec())),
            Err(SheetfillError::Load(_))
        ));
    }
}
