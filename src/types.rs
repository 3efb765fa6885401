use serde::{Deserialize, Serialize};
use std::path::Path;

/// One data row of the input workbook, keyed by header name.
///
/// Fields keep the header (column) order, which archive naming depends on.
/// Only populated cells are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRow {
    fields: Vec<(String, String)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; a repeated header keeps its first position and the last value.
    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        let header = header.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(h, _)| *h == header) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((header, value)),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DataRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = DataRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Parsed input workbook: the header row plus every non-empty data row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    pub headers: Vec<String>,
    pub rows: Vec<DataRow>,
}

/// Spreadsheet container formats, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetFormat {
    Xlsx,
    /// Macro-enabled. Users are warned before processing: macros and other
    /// active content are not guaranteed to survive.
    Xlsm,
    Xls,
    Ods,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xlsx" => Some(SheetFormat::Xlsx),
            "xlsm" => Some(SheetFormat::Xlsm),
            "xls" => Some(SheetFormat::Xls),
            "ods" => Some(SheetFormat::Ods),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SheetFormat::Xlsx => "xlsx",
            SheetFormat::Xlsm => "xlsm",
            SheetFormat::Xls => "xls",
            SheetFormat::Ods => "ods",
        }
    }

    pub fn is_macro_enabled(&self) -> bool {
        matches!(self, SheetFormat::Xlsm)
    }

    /// Only OOXML packages can be cloned and patched per row.
    pub fn supports_batch(&self) -> bool {
        matches!(self, SheetFormat::Xlsx | SheetFormat::Xlsm)
    }
}

/// One materialized workbook, produced from the template and one data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    /// Positional name, `output_<row+1>`.
    pub name: String,
    /// Index of the data row this artifact was built from.
    pub row_index: usize,
    pub format: SheetFormat,
    pub data: Vec<u8>,
}

impl OutputArtifact {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.format.extension())
    }
}
