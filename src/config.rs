//! Run configuration: YAML job files merged with command-line overrides
//!
//! ```yaml
//! input: data/customers.xlsx
//! template: forms/invoice.xlsx
//! sheet: Invoice          # optional, defaults to the first worksheet
//! output: out/invoices.zip
//! mappings:
//!   - source: Name
//!     target: B4
//!   - source: Code
//!     target: F2
//! ```

use crate::archive::DEFAULT_ARCHIVE_NAME;
use crate::error::{SheetfillError, SheetfillResult};
use crate::mapping::{ColumnMapping, MappingStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_STORE_FILE: &str = ".sheetfill-mappings.json";

/// One `source: target` entry of a job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobMapping {
    pub source: String,
    pub target: String,
}

impl From<&ColumnMapping> for JobMapping {
    fn from(m: &ColumnMapping) -> Self {
        Self {
            source: m.source_column.clone(),
            target: m.target_cell.clone(),
        }
    }
}

impl From<JobMapping> for ColumnMapping {
    fn from(m: JobMapping) -> Self {
        ColumnMapping::new(m.source, m.target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub mappings: Vec<JobMapping>,
}

impl JobConfig {
    /// Load a job file. Relative paths inside it are taken relative to the
    /// file's own directory.
    pub fn load(path: &Path) -> SheetfillResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SheetfillError::Config(format!("Cannot read job file {}: {}", path.display(), e))
        })?;
        let mut job = Self::from_yaml(&content).map_err(|e| match e {
            SheetfillError::Config(msg) => {
                SheetfillError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        Ok(job)
    }

    pub fn from_yaml(content: &str) -> SheetfillResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SheetfillError::Config(format!("Invalid job file: {}", e)))
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.input, &mut self.template, &mut self.output]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Parse a `SOURCE=CELL` command-line mapping. The cell is the part after
/// the last `=`.
pub fn parse_map_arg(arg: &str) -> SheetfillResult<ColumnMapping> {
    match arg.rsplit_once('=') {
        Some((source, target)) if !source.trim().is_empty() && !target.trim().is_empty() => {
            Ok(ColumnMapping::new(source.trim(), target.trim().to_ascii_uppercase()))
        }
        _ => Err(SheetfillError::Config(format!(
            "Invalid mapping '{}': expected SOURCE=CELL, for example Name=B4",
            arg
        ))),
    }
}

/// Command-line side of a `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub job: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub sheet: Option<String>,
    pub output: Option<PathBuf>,
    pub maps: Vec<String>,
    pub suggest: bool,
    pub accept_macro_loss: bool,
    pub store: Option<PathBuf>,
    pub verbose: bool,
}

/// A fully resolved `run`.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub input: PathBuf,
    pub template: PathBuf,
    pub sheet: Option<String>,
    pub output: PathBuf,
    /// Job-file mappings, then `--map` mappings upserted over them.
    pub mappings: MappingStore,
    pub suggest: bool,
    pub accept_macro_loss: bool,
    /// `None` disables mapping memory.
    pub store: Option<PathBuf>,
    pub verbose: bool,
}

impl RunSettings {
    pub fn resolve(overrides: RunOverrides) -> SheetfillResult<Self> {
        let job = match &overrides.job {
            Some(path) => JobConfig::load(path)?,
            None => JobConfig::default(),
        };

        let input = overrides.input.or(job.input).ok_or_else(|| {
            SheetfillError::Config("No input file given (use --input or a job file).".to_string())
        })?;
        let template = overrides.template.or(job.template).ok_or_else(|| {
            SheetfillError::Config(
                "No template file given (use --template or a job file).".to_string(),
            )
        })?;

        let mut mappings: MappingStore = job.mappings.into_iter().map(ColumnMapping::from).collect();
        for arg in &overrides.maps {
            let m = parse_map_arg(arg)?;
            mappings.add(m.source_column, m.target_cell);
        }

        Ok(Self {
            input,
            template,
            sheet: overrides.sheet.or(job.sheet),
            output: overrides
                .output
                .or(job.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_NAME)),
            mappings,
            suggest: overrides.suggest,
            accept_macro_loss: overrides.accept_macro_loss,
            store: overrides.store,
            verbose: overrides.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_job_yaml() {
        let job = JobConfig::from_yaml(
            "input: data.xlsx\ntemplate: form.xlsx\nmappings:\n  - source: Name\n    target: B4\n",
        )
        .unwrap();
        assert_eq!(job.input, Some(PathBuf::from("data.xlsx")));
        assert_eq!(job.sheet, None);
        assert_eq!(
            job.mappings,
            vec![JobMapping {
                source: "Name".into(),
                target: "B4".into()
            }]
        );
    }

    #[test]
    fn test_unknown_job_field_is_rejected() {
        let err = JobConfig::from_yaml("input: a.xlsx\ntemplat: b.xlsx\n").unwrap_err();
        assert!(matches!(err, SheetfillError::Config(_)));
    }

    #[test]
    fn test_job_paths_resolve_against_job_dir() {
        let dir = TempDir::new().unwrap();
        let job_path = dir.path().join("job.yaml");
        std::fs::write(
            &job_path,
            "input: data.xlsx\ntemplate: /abs/form.xlsx\noutput: out/all.zip\n",
        )
        .unwrap();
        let job = JobConfig::load(&job_path).unwrap();
        assert_eq!(job.input, Some(dir.path().join("data.xlsx")));
        assert_eq!(job.template, Some(PathBuf::from("/abs/form.xlsx")));
        assert_eq!(job.output, Some(dir.path().join("out/all.zip")));
    }

    #[test]
    fn test_parse_map_arg() {
        assert_eq!(parse_map_arg("Name=b4").unwrap(), ColumnMapping::new("Name", "B4"));
        assert_eq!(parse_map_arg("a=b=C1").unwrap(), ColumnMapping::new("a=b", "C1"));
        for bad in ["Name", "=B4", "Name=", ""] {
            assert!(parse_map_arg(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_cli_overrides_job() {
        let dir = TempDir::new().unwrap();
        let job_path = dir.path().join("job.yaml");
        std::fs::write(
            &job_path,
            "input: data.xlsx\ntemplate: form.xlsx\nsheet: Form\nmappings:\n  - source: Name\n    target: B4\n  - source: Code\n    target: B5\n",
        )
        .unwrap();

        let settings = RunSettings::resolve(RunOverrides {
            job: Some(job_path),
            template: Some(PathBuf::from("other.xlsx")),
            maps: vec!["Name=C9".to_string(), "City=D1".to_string()],
            ..Default::default()
        })
        .unwrap();

        assert_eq!(settings.input, dir.path().join("data.xlsx"));
        assert_eq!(settings.template, PathBuf::from("other.xlsx"));
        assert_eq!(settings.sheet.as_deref(), Some("Form"));
        assert_eq!(settings.output, PathBuf::from(DEFAULT_ARCHIVE_NAME));
        assert_eq!(
            settings.mappings.as_slice(),
            &[
                ColumnMapping::new("Name", "C9"),
                ColumnMapping::new("Code", "B5"),
                ColumnMapping::new("City", "D1"),
            ]
        );
    }

    #[test]
    fn test_missing_input_is_config_error() {
        let err = RunSettings::resolve(RunOverrides {
            template: Some(PathBuf::from("t.xlsx")),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.user_message().contains("No input file"));
    }
}
