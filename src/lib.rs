//! Sheetfill - fill an Excel template once per data row
//!
//! Reads a data workbook (first row = headers), maps its columns onto cells
//! of an Excel template, writes one filled copy of the template per data row
//! and bundles the copies into a single zip archive.
//!
//! # Features
//!
//! - A1 cell address codec (`address`)
//! - Template grid extraction with merges, styles, dates and rich text (`grid`, `excel`)
//! - Column → cell mappings with label-based suggestions and recall (`mapping`)
//! - Per-row template materialization with style-preserving writes (`batch`)
//! - Zip assembly with identifier-based file names (`archive`)
//!
//! # Example
//!
//! ```no_run
//! use sheetfill::archive::assemble_archive;
//! use sheetfill::batch::run_template_batch;
//! use sheetfill::excel::{parse_input_file, read_workbook_file};
//! use sheetfill::mapping::MappingStore;
//! use std::path::Path;
//!
//! let data = parse_input_file(Path::new("customers.xlsx"))?;
//! let (template, format) = read_workbook_file(Path::new("invoice.xlsx"))?;
//!
//! let mut mappings = MappingStore::new();
//! mappings.add("Name", "B4");
//! mappings.add("Code", "F2");
//!
//! let outcome = run_template_batch(&template, format, None, &data.rows, mappings.as_slice(), |p| {
//!     println!("{}%", p);
//! })?;
//! let archive = assemble_archive(&outcome.artifacts, &data.rows)?;
//! std::fs::write("output_files.zip", &archive.bytes)?;
//! # Ok::<(), sheetfill::error::SheetfillError>(())
//! ```

pub mod address;
pub mod archive;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod excel;
pub mod grid;
pub mod mapping;
pub mod types;

// Re-export commonly used types
pub use address::{to_address, to_indices, CellAddress, CellRange};
pub use error::{SheetfillError, SheetfillResult};
pub use grid::{extract_grid, GridCell, GridModel, Worksheet};
pub use mapping::{suggest_mappings, ColumnMapping, MappingStore};
pub use types::{DataRow, InputData, OutputArtifact, SheetFormat};
