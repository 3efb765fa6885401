//! OPC package access: zip parts in, zip parts out

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Largest part we inflate into memory.
pub const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error in {part}: {message}")]
    Xml { part: String, message: String },
    #[error("missing part: {0}")]
    MissingPart(String),
    #[error("part too large: {0}")]
    PartTooLarge(String),
}

impl PackageError {
    pub fn xml(part: &str, err: impl std::fmt::Display) -> Self {
        PackageError::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}

/// A read-only view over a zip container held in shared memory.
#[derive(Debug, Clone)]
pub struct Package {
    bytes: Arc<[u8]>,
    part_names: Vec<String>,
}

impl Package {
    pub fn open(bytes: Arc<[u8]>) -> Result<Self, PackageError> {
        let archive = ZipArchive::new(Cursor::new(&bytes[..]))?;
        let part_names = archive.file_names().map(str::to_string).collect();
        Ok(Self { bytes, part_names })
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.resolve_name(name).is_some()
    }

    /// Part names are matched ignoring a leading `/` and ASCII case.
    fn resolve_name(&self, name: &str) -> Option<&str> {
        let wanted = name.trim_start_matches('/');
        self.part_names
            .iter()
            .find(|n| n.trim_start_matches('/').eq_ignore_ascii_case(wanted))
            .map(String::as_str)
    }

    pub fn read_part(&self, name: &str) -> Result<Option<Vec<u8>>, PackageError> {
        let Some(actual) = self.resolve_name(name) else {
            return Ok(None);
        };
        let mut archive = ZipArchive::new(Cursor::new(&self.bytes[..]))?;
        let file = archive.by_name(actual)?;
        if file.size() > MAX_PART_BYTES {
            return Err(PackageError::PartTooLarge(actual.to_string()));
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.take(MAX_PART_BYTES).read_to_end(&mut data)?;
        Ok(Some(data))
    }

    pub fn require_part(&self, name: &str) -> Result<Vec<u8>, PackageError> {
        self.read_part(name)?
            .ok_or_else(|| PackageError::MissingPart(name.to_string()))
    }

    /// Write a new container: replaced parts are recompressed, removed parts
    /// are left out, every other part is copied byte-for-byte in its original
    /// order.
    pub fn rewrite(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
        removals: &[String],
    ) -> Result<Vec<u8>, PackageError> {
        let mut archive = ZipArchive::new(Cursor::new(&self.bytes[..]))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(self.bytes.len())));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let same_part = |wanted: &str, name: &str| wanted.trim_start_matches('/').eq_ignore_ascii_case(name);

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let name = file.name().to_string();
            if removals.iter().any(|r| same_part(r, &name)) {
                continue;
            }
            let replacement = replacements
                .iter()
                .find(|(k, _)| same_part(k, &name))
                .map(|(_, v)| v);
            match replacement {
                Some(data) => {
                    drop(file);
                    writer.start_file(name, options)?;
                    writer.write_all(data)?;
                }
                None => writer.raw_copy_file(file)?,
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Directory part of a part name, with a trailing `/` (empty at the root).
pub fn part_dir(part: &str) -> &str {
    match part.rfind('/') {
        Some(idx) => &part[..=idx],
        None => "",
    }
}

/// Resolve a relationship target against the part that owns the relationship.
pub fn resolve_target(owner: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = part_dir(owner).split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Relationships part that belongs to `part`, e.g. `xl/_rels/workbook.xml.rels`.
pub fn rels_part_for(part: &str) -> String {
    let dir = part_dir(part);
    let file = &part[dir.len()..];
    format!("{}_rels/{}.rels", dir, file)
}
