use ejiview::error::EjiError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum EjiCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("{0}")]
    EjiError(#[from] EjiError),
    #[error("Invalid config file {path}: {source}")]
    InvalidConfig {
        path: String,
        source: toml::de::Error,
    },
    #[error("No config directory found for this platform")]
    NoConfigDir,
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type EjiCliResult<T> = Result<T, EjiCliError>;
