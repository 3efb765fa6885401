//! Calculation chain removal
//!
//! `calcChain.xml` lists every formula cell in evaluation order. Once a write
//! replaces a formula with a plain value the chain is stale, and Excel repairs
//! the file on open. Dropping the chain is always safe: Excel rebuilds it.

use super::package::PackageError;
use super::xml::attr;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const CALC_CHAIN_REL: &str = "/calcChain";

/// Copy `xml` without the `element` entries for which `is_dropped` holds.
fn without_elements(
    part: &str,
    xml: &[u8],
    element: &[u8],
    is_dropped: impl Fn(&BytesStart<'_>) -> bool,
) -> Result<Vec<u8>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| PackageError::xml(part, e))?;
        match event {
            Event::Eof => break,
            _ if depth > 0 => match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                _ => {}
            },
            Event::Start(ref e) if e.local_name().as_ref() == element && is_dropped(e) => depth = 1,
            Event::Empty(ref e) if e.local_name().as_ref() == element && is_dropped(e) => {}
            other => writer
                .write_event(other)
                .map_err(|e| PackageError::xml(part, e))?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Workbook relationships without the calcChain relationship.
pub fn remove_calc_chain_relationship(part: &str, rels_xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    without_elements(part, rels_xml, b"Relationship", |e| {
        attr(e, b"Type").is_some_and(|t| t.ends_with(CALC_CHAIN_REL))
            || attr(e, b"Target").is_some_and(|t| t.ends_with("calcChain.xml"))
    })
}

/// Content types without the calcChain override.
pub fn remove_calc_chain_override(ct_xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    without_elements(CONTENT_TYPES_PART, ct_xml, b"Override", |e| {
        attr(e, b"PartName").is_some_and(|p| p.ends_with("calcChain.xml"))
    })
}
