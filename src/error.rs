use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgeryError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unrecognized schema: no importer matches header {0:?}")]
    UnrecognizedSchema(Vec<String>),

    #[error("Malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown budget: {0}")]
    UnknownBudget(i64),

    #[error("Unknown budget entry: {0}")]
    UnknownBudgetEntry(i64),

    #[error("Unknown import job: {0}")]
    UnknownJob(i64),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl BudgeryError {
    pub fn malformed(row: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            row,
            reason: reason.into(),
        }
    }

    /// Stable code recorded on a failed import job.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::UnrecognizedSchema(_) => "unrecognized_schema",
            Self::MalformedRow { .. } | Self::Csv(_) => "malformed_row",
            Self::PersistenceFailure(_) | Self::Db(_) => "persistence_failure",
            _ => "failed_parsing_file",
        }
    }
}

pub type Result<T> = std::result::Result<T, BudgeryError>;
