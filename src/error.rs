use thiserror::Error;

pub type SheetfillResult<T> = Result<T, SheetfillError>;

#[derive(Error, Debug)]
pub enum SheetfillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input data workbook unreadable or without sheets. Aborts the operation.
    #[error("Input parse error: {0}")]
    Parse(String),

    /// Template workbook unreadable. Aborts the operation.
    #[error("Template load error: {0}")]
    Load(String),

    /// One mapping could not be written. The row continues.
    #[error("Row {row}: cannot write cell {address}: {reason}")]
    CellWrite {
        row: usize,
        address: String,
        reason: String,
    },

    /// One row could not be cloned, filled or serialized. The row is skipped.
    #[error("Row {row} could not be materialized: {reason}")]
    RowMaterialization { row: usize, reason: String },

    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SheetfillError {
    /// One-line message for end users, naming the failure class rather than
    /// the internal cause.
    pub fn user_message(&self) -> String {
        match self {
            SheetfillError::Io(_) => "A file could not be read or written.".to_string(),
            SheetfillError::Parse(_) => {
                "The input data file could not be read. Check that it is a valid spreadsheet with at least one sheet."
                    .to_string()
            }
            SheetfillError::Load(_) => {
                "The template file could not be opened. Check that it is a valid .xlsx or .xlsm workbook."
                    .to_string()
            }
            SheetfillError::CellWrite { address, .. } => {
                format!("A value could not be written to cell {}.", address)
            }
            SheetfillError::RowMaterialization { row, .. } => {
                format!("Row {} could not be turned into an output file.", row)
            }
            SheetfillError::InvalidAddress(address) => {
                format!("'{}' is not a valid cell address (expected something like B7).", address)
            }
            SheetfillError::Archive(_) => "The output archive could not be created.".to_string(),
            SheetfillError::Config(msg) => msg.clone(),
        }
    }
}
