//! Error types for the RistrettoDB table engine.

use thiserror::Error;

use crate::schema::ColumnType;

pub type RistrettoResult<T> = std::result::Result<T, RistrettoError>;

#[derive(Error, Debug)]
pub enum RistrettoError {
    #[error("schema rejected: {0}")]
    Schema(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid table file: {0}")]
    InvalidFormat(String),

    #[error("column '{column}' expects {expected:?}, got {got}")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
        got: &'static str,
    },

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("table handle is closed")]
    HandleClosed,
}
