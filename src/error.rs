use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxaError {
    #[error("Required input not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("Column '{column}' missing from {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{service} lookup failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaxaError {
    pub fn external(service: &str, message: impl Into<String>) -> Self {
        TaxaError::ExternalService {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn missing_column(column: &str, source_name: &str) -> Self {
        TaxaError::MissingColumn {
            column: column.to_string(),
            source_name: source_name.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaxaError>;
