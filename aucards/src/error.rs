//! Error types for Aucards
//!
//! All errors use thiserror for structured error handling.
//! Validation of user edits is carried in state flags instead; these
//! errors cover storage, files and rejected values.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Card not found: {0}")]
    CardNotFound(i64),

    #[error("Category not found: {0}")]
    CategoryNotFound(i64),

    #[error("Invalid value {value:?} for setting {key:?}")]
    InvalidSetting { key: String, value: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Image store error: {0}")]
    ImageStore(String),

    #[error("{0}")]
    Generic(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
