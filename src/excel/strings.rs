//! Shared string table (`xl/sharedStrings.xml`)

use super::package::PackageError;
use crate::grid::CellValue;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A string item: plain text, or a list of formatted runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedString {
    pub runs: Vec<String>,
    pub rich: bool,
}

impl SharedString {
    pub fn to_value(&self) -> CellValue {
        if self.rich {
            CellValue::RichText(self.runs.clone())
        } else {
            CellValue::text(self.runs.concat())
        }
    }
}

/// Collects `<t>` text of a string item, skipping phonetic (`rPh`) runs.
#[derive(Debug, Default)]
pub(crate) struct StringItemBuilder {
    item: SharedString,
    in_phonetic: bool,
    in_text: bool,
}

impl StringItemBuilder {
    pub fn open(&mut self, local: &[u8]) {
        match local {
            b"r" => self.item.rich = true,
            b"rPh" => self.in_phonetic = true,
            b"t" if !self.in_phonetic => {
                self.in_text = true;
                self.item.runs.push(String::new());
            }
            _ => {}
        }
    }

    pub fn close(&mut self, local: &[u8]) {
        match local {
            b"rPh" => self.in_phonetic = false,
            b"t" => self.in_text = false,
            _ => {}
        }
    }

    pub fn text(&mut self, text: &str) {
        if self.in_text {
            if let Some(run) = self.item.runs.last_mut() {
                run.push_str(text);
            }
        }
    }

    pub fn finish(self) -> SharedString {
        self.item
    }
}

pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<SharedString>, PackageError> {
    const PART: &str = "xl/sharedStrings.xml";
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<StringItemBuilder> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| PackageError::xml(PART, e))?
        {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(StringItemBuilder::default()),
                other => {
                    if let Some(b) = current.as_mut() {
                        b.open(other)
                    }
                }
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(SharedString::default());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take().map(StringItemBuilder::finish)),
                other => {
                    if let Some(b) = current.as_mut() {
                        b.close(other)
                    }
                }
            },
            Event::Text(t) => {
                if let Some(b) = current.as_mut() {
                    let text = t.unescape().map_err(|e| PackageError::xml(PART, e))?;
                    b.text(&text);
                }
            }
            Event::CData(t) => {
                if let Some(b) = current.as_mut() {
                    b.text(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}
