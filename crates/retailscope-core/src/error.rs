// crates/retailscope-core/src/error.rs

use retailscope_parser::ParserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error reading file: {0}")]
    Parse(#[from] ParserError),

    #[error("Dataset validation failed: {0}")]
    SchemaValidation(String),

    #[error("Error converting dates in column '{column}' at row {row}: {message}")]
    DateConversion {
        column: String,
        row: usize,
        message: String,
    },

    #[error("Forecast unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Errors caused by the uploaded content or the request rather than the service.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Parse(_)
                | PipelineError::SchemaValidation(_)
                | PipelineError::DateConversion { .. }
                | PipelineError::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
