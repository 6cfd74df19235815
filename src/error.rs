use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Data load error: {0}")]
    DataLoad(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for EtlError {
    fn from(err: polars::error::PolarsError) -> Self {
        EtlError::Polars(err.to_string())
    }
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        EtlError::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
