//! `xl/styles.xml`: just enough of it for the grid's style projection and
//! for telling dates from plain numbers.

use super::dates::{is_builtin_date_format, is_date_format_code};
use super::package::PackageError;
use super::xml::{attr, toggle};
use crate::grid::CellStyle;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Font {
    bold: bool,
    italic: bool,
    underline: bool,
    color: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Fill {
    solid: bool,
    fg_color: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Xf {
    num_fmt_id: Option<u32>,
    font_id: Option<usize>,
    fill_id: Option<usize>,
    border_id: Option<usize>,
    horizontal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    NumFmts,
    Fonts,
    Fills,
    Borders,
    CellXfs,
}

#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    num_fmts: HashMap<u32, String>,
    fonts: Vec<Font>,
    fills: Vec<Fill>,
    borders: Vec<bool>,
    xfs: Vec<Xf>,
}

/// `FFRRGGBB` → `RRGGBB`; anything else that is not plain RGB is dropped.
fn rgb(e: &BytesStart<'_>) -> Option<String> {
    let value = attr(e, b"rgb")?;
    match value.len() {
        8 => Some(value[2..].to_string()),
        6 => Some(value),
        _ => None,
    }
}

impl StyleSheet {
    pub fn parse(xml: &[u8]) -> Result<Self, PackageError> {
        const PART: &str = "xl/styles.xml";
        let mut sheet = StyleSheet::default();
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        let mut section = Section::None;
        let mut font: Option<Font> = None;
        let mut fill: Option<Fill> = None;
        let mut border: Option<bool> = None;
        let mut xf: Option<Xf> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| PackageError::xml(PART, e))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let empty = matches!(event, Event::Empty(_));
                    match (section, e.local_name().as_ref()) {
                        (_, b"numFmts") if !empty => section = Section::NumFmts,
                        (_, b"fonts") if !empty => section = Section::Fonts,
                        (_, b"fills") if !empty => section = Section::Fills,
                        (_, b"borders") if !empty => section = Section::Borders,
                        (_, b"cellXfs") if !empty => section = Section::CellXfs,

                        (Section::NumFmts, b"numFmt") => {
                            if let (Some(id), Some(code)) = (
                                attr(e, b"numFmtId").and_then(|v| v.parse().ok()),
                                attr(e, b"formatCode"),
                            ) {
                                sheet.num_fmts.insert(id, code);
                            }
                        }

                        (Section::Fonts, b"font") => {
                            if empty {
                                sheet.fonts.push(Font::default());
                            } else {
                                font = Some(Font::default());
                            }
                        }
                        (Section::Fonts, b"b") => {
                            if let Some(f) = font.as_mut() {
                                f.bold = toggle(e);
                            }
                        }
                        (Section::Fonts, b"i") => {
                            if let Some(f) = font.as_mut() {
                                f.italic = toggle(e);
                            }
                        }
                        (Section::Fonts, b"u") => {
                            if let Some(f) = font.as_mut() {
                                f.underline = toggle(e);
                            }
                        }
                        (Section::Fonts, b"color") => {
                            if let Some(f) = font.as_mut() {
                                f.color = rgb(e);
                            }
                        }

                        (Section::Fills, b"fill") => {
                            if empty {
                                sheet.fills.push(Fill::default());
                            } else {
                                fill = Some(Fill::default());
                            }
                        }
                        (Section::Fills, b"patternFill") => {
                            if let Some(f) = fill.as_mut() {
                                f.solid = attr(e, b"patternType").as_deref() == Some("solid");
                            }
                        }
                        (Section::Fills, b"fgColor") => {
                            if let Some(f) = fill.as_mut() {
                                f.fg_color = rgb(e);
                            }
                        }

                        (Section::Borders, b"border") => {
                            if empty {
                                sheet.borders.push(false);
                            } else {
                                border = Some(false);
                            }
                        }
                        (Section::Borders, b"left" | b"right" | b"top" | b"bottom" | b"start" | b"end") => {
                            if let Some(b) = border.as_mut() {
                                let styled = attr(e, b"style").is_some_and(|s| s != "none");
                                *b = *b || styled;
                            }
                        }

                        (Section::CellXfs, b"xf") => {
                            let parsed = Xf {
                                num_fmt_id: attr(e, b"numFmtId").and_then(|v| v.parse().ok()),
                                font_id: attr(e, b"fontId").and_then(|v| v.parse().ok()),
                                fill_id: attr(e, b"fillId").and_then(|v| v.parse().ok()),
                                border_id: attr(e, b"borderId").and_then(|v| v.parse().ok()),
                                horizontal: None,
                            };
                            if empty {
                                sheet.xfs.push(parsed);
                            } else {
                                xf = Some(parsed);
                            }
                        }
                        (Section::CellXfs, b"alignment") => {
                            if let Some(x) = xf.as_mut() {
                                x.horizontal = attr(e, b"horizontal");
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"numFmts" | b"fonts" | b"fills" | b"borders" | b"cellXfs" => {
                        section = Section::None
                    }
                    b"font" => sheet.fonts.extend(font.take()),
                    b"fill" => sheet.fills.extend(fill.take()),
                    b"border" => sheet.borders.extend(border.take()),
                    b"xf" => sheet.xfs.extend(xf.take()),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(sheet)
    }

    /// Style projection for a cell's `s` index. Unknown indices or missing
    /// sub-records yield absent/false attributes.
    pub fn projection(&self, xf_index: usize) -> CellStyle {
        let Some(xf) = self.xfs.get(xf_index) else {
            return CellStyle::default();
        };
        let font = xf.font_id.and_then(|i| self.fonts.get(i));
        let fill = xf.fill_id.and_then(|i| self.fills.get(i));
        CellStyle {
            background_color: fill.filter(|f| f.solid).and_then(|f| f.fg_color.clone()),
            color: font.and_then(|f| f.color.clone()),
            bold: font.is_some_and(|f| f.bold),
            italic: font.is_some_and(|f| f.italic),
            underline: font.is_some_and(|f| f.underline),
            alignment: xf.horizontal.clone(),
            border: xf
                .border_id
                .and_then(|i| self.borders.get(i).copied())
                .unwrap_or(false),
        }
    }

    pub fn is_date(&self, xf_index: usize) -> bool {
        let Some(id) = self.xfs.get(xf_index).and_then(|xf| xf.num_fmt_id) else {
            return false;
        };
        match self.num_fmts.get(&id) {
            Some(code) => is_date_format_code(code),
            None => is_builtin_date_format(id),
        }
    }
}
