//! Shared fixtures: workbooks generated with rust_xlsxwriter

#![allow(dead_code)]

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{
    Color, ExcelDateTime, Format, FormatAlign, FormatBorder, FormatUnderline, Workbook,
};
use sheetfill::excel::TemplateWorkbook;
use sheetfill::grid::{extract_grid, GridModel};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// An invoice-style form on sheet "Form" plus a "Notes" sheet.
///
/// - A1 "Invoice" bold, italic, underlined, centered, row height 30
/// - A2 "Name:", A3 "Code:", A4 "City:" as labels
/// - B2 blank with a yellow fill and a border (the value slot for the name)
/// - D1:E2 merged, "Logo", red text
/// - A6 the date 2024-03-15
pub fn form_template() -> Vec<u8> {
    let mut workbook = Workbook::new();

    let title = Format::new()
        .set_bold()
        .set_italic()
        .set_underline(FormatUnderline::Single)
        .set_align(FormatAlign::Center);
    let slot = Format::new()
        .set_background_color(Color::RGB(0xFFFF00))
        .set_border(FormatBorder::Thin);
    let logo = Format::new().set_font_color(Color::RGB(0xFF0000));
    let date = Format::new().set_num_format("yyyy-mm-dd");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Form").unwrap();
    sheet.write_string_with_format(0, 0, "Invoice", &title).unwrap();
    sheet.set_row_height(0, 30).unwrap();
    sheet.write_string(1, 0, "Name:").unwrap();
    sheet.write_string(2, 0, "Code:").unwrap();
    sheet.write_string(3, 0, "City:").unwrap();
    sheet.write_blank(1, 1, &slot).unwrap();
    sheet.merge_range(0, 3, 1, 4, "Logo", &logo).unwrap();
    let day = ExcelDateTime::from_ymd(2024, 3, 15).unwrap();
    sheet.write_datetime_with_format(5, 0, &day, &date).unwrap();

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "Internal").unwrap();

    workbook.save_to_buffer().unwrap()
}

/// A hand-built "Calc" sheet whose value slots hold formulas, with a
/// calculation chain:
///
/// - A1:A3 prices 10, 20, 30
/// - B1:B3 one shared formula group, master B1 `A1*2`
/// - C1 plain formula `SUM(A1:A3)`
pub fn formula_template() -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Calc" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#,
        ),
        (
            "xl/worksheets/sheet1.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:C3"/><sheetData><row r="1"><c r="A1"><v>10</v></c><c r="B1"><f t="shared" ref="B1:B3" si="0">A1*2</f><v>20</v></c><c r="C1"><f>SUM(A1:A3)</f><v>60</v></c></row><row r="2"><c r="A2"><v>20</v></c><c r="B2"><f t="shared" si="0"/><v>40</v></c></row><row r="3"><c r="A3"><v>30</v></c><c r="B3"><f t="shared" si="0"/><v>60</v></c></row></sheetData></worksheet>"#,
        ),
        (
            "xl/calcChain.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="B1" i="1"/><c r="B2"/><c r="B3"/><c r="C1"/></calcChain>"#,
        ),
    ];

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Formula text as calamine sees it, on the named sheet.
pub fn calamine_formula(bytes: &[u8], sheet: &str, address: &str) -> Option<String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    let range = workbook.worksheet_formula(sheet).unwrap();
    let (row, col) = sheetfill::to_indices(address).unwrap();
    range
        .get_value((row - 1, col - 1))
        .filter(|f| !f.is_empty())
        .cloned()
}

/// A data workbook: `headers` in row 1, then one row per entry of `rows`.
/// Values that parse as numbers are written as numbers.
pub fn data_workbook(headers: &[&str], rows: &[&[&str]]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            let (r, col) = (r as u32 + 1, col as u16);
            if value.is_empty() {
                continue;
            }
            match value.parse::<f64>() {
                Ok(n) => sheet.write_number(r, col, n).unwrap(),
                Err(_) => sheet.write_string(r, col, *value).unwrap(),
            };
        }
    }
    workbook.save_to_buffer().unwrap()
}

pub fn customers() -> Vec<u8> {
    data_workbook(
        &["Name", "Code", "City"],
        &[
            &["Ada", "A-1", "London"],
            &["Grace", "B-2", "New York"],
            &["Linus", "C-3", "Helsinki"],
        ],
    )
}

pub fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Grid of one sheet, read back with the crate's own OOXML reader.
pub fn grid_of(bytes: &[u8], sheet: Option<&str>) -> GridModel {
    let workbook = TemplateWorkbook::open(Arc::from(bytes.to_vec())).unwrap();
    let index = workbook.sheet_index(sheet).unwrap();
    extract_grid(&workbook.worksheet(index).unwrap())
}

pub fn cell_text(bytes: &[u8], sheet: Option<&str>, address: &str) -> Option<String> {
    grid_of(bytes, sheet).cell(address)?.value.clone()
}

/// Cell value as calamine sees it, on the named sheet.
pub fn calamine_text(bytes: &[u8], sheet: &str, address: &str) -> Option<String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    let range = workbook.worksheet_range(sheet).unwrap();
    let (row, col) = sheetfill::to_indices(address).unwrap();
    match range.get_value((row - 1, col - 1))? {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            (file.name().to_string(), data)
        })
        .collect()
}
