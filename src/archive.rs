//! Bundle materialized workbooks into one zip archive

use crate::error::{SheetfillError, SheetfillResult};
use crate::types::{DataRow, OutputArtifact};
use std::io::{Cursor, Write};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DEFAULT_ARCHIVE_NAME: &str = "output_files.zip";

/// Deflate level used for archive entries.
pub const COMPRESSION_LEVEL: i64 = 6;

/// Header keywords that mark a column as a row identifier, highest priority
/// first: Persian ID, code, number and name, then their English forms.
pub const IDENTIFIER_KEYWORDS: &[&str] = &["شناسه", "کد", "شماره", "نام", "id", "code", "name"];

#[derive(Debug, Clone, Default)]
pub struct ArchiveOutcome {
    pub bytes: Vec<u8>,
    /// Entry names in archive order.
    pub entries: Vec<String>,
    /// Names that more than one artifact mapped to; the later artifact won.
    pub duplicate_names: Vec<String>,
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_file_stem(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Archive entry name for one artifact: the first identifier-like field of
/// its row with a value, or the artifact's positional name.
pub fn derive_file_name(artifact: &OutputArtifact, row: Option<&DataRow>) -> String {
    let ext = artifact.format.extension();
    let identifier = row.and_then(|row| {
        IDENTIFIER_KEYWORDS.iter().find_map(|keyword| {
            row.fields()
                .find(|(header, value)| {
                    header.to_lowercase().contains(keyword) && !value.trim().is_empty()
                })
                .map(|(_, value)| sanitize_file_stem(value))
        })
    });
    match identifier {
        Some(stem) => format!("{}.{}", stem, ext),
        None => artifact.file_name(),
    }
}

/// Zip every artifact, in order, naming each from its source row.
///
/// Two artifacts with the same derived name produce a single entry holding
/// the later artifact, at the position of the first.
pub fn assemble_archive(
    artifacts: &[OutputArtifact],
    rows: &[DataRow],
) -> SheetfillResult<ArchiveOutcome> {
    let mut entries: Vec<(String, &[u8])> = Vec::with_capacity(artifacts.len());
    let mut duplicate_names = Vec::new();

    for artifact in artifacts {
        let name = derive_file_name(artifact, rows.get(artifact.row_index));
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                warn!(
                    name = %name,
                    row = artifact.row_index + 1,
                    "duplicate archive entry name, later row replaces earlier"
                );
                slot.1 = artifact.data.as_slice();
                if !duplicate_names.contains(&name) {
                    duplicate_names.push(name);
                }
            }
            None => {
                debug!(name = %name, row = artifact.row_index + 1, "adding archive entry");
                entries.push((name, artifact.data.as_slice()));
            }
        }
    }

    let archive_err = |e: zip::result::ZipError| SheetfillError::Archive(e.to_string());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in &entries {
        writer.start_file(name.as_str(), options).map_err(archive_err)?;
        writer
            .write_all(data)
            .map_err(|e| SheetfillError::Archive(e.to_string()))?;
    }
    let bytes = writer.finish().map_err(archive_err)?.into_inner();

    info!(
        entries = entries.len(),
        duplicates = duplicate_names.len(),
        bytes = bytes.len(),
        "archive assembled"
    );

    Ok(ArchiveOutcome {
        bytes,
        entries: entries.into_iter().map(|(name, _)| name).collect(),
        duplicate_names,
    })
}
