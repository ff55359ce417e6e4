//! Error types.

use crate::dataset::TableRole;

#[derive(thiserror::Error, Debug)]
pub enum EjiError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Failed to fetch '{path}': {reason}")]
    FetchFailed { path: String, reason: String },
    #[error("Year {0} is not one of the configured years.")]
    UnknownYear(String),
    #[error("No data found for {geography} in {year}.")]
    EmptySelection { geography: String, year: String },
    #[error("Malformed value '{value}' in column {column}: expected a number.")]
    MalformedValue { column: String, value: String },
    #[error("Value {value} in column {column} is outside the percentile range [0, 1].")]
    OutOfRange { column: String, value: f64 },
    #[error("Column not found: {0}")]
    MissingColumn(String),
    #[error("No {role} table available for {year}.")]
    MissingTable { role: TableRole, year: String },
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
}

pub type EjiResult<T> = Result<T, EjiError>;

impl EjiError {
    /// Errors that only mean the selection matched nothing, rather than that the data or the
    /// request were broken.
    pub fn is_empty_selection(&self) -> bool {
        matches!(self, EjiError::EmptySelection { .. })
    }
}
