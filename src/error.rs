//! Error types for redunda operations

use thiserror::Error;

/// Result type alias for redunda operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur during trace analysis and registry operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Instruction dump for a cubin is missing on disk
    #[error("no such file: {0}")]
    NoSuchFile(String),

    /// Instruction dump exists but could not be parsed
    #[error("failed to analyze cubin: {0}")]
    FailedAnalyzeCubin(String),

    /// A cubin, snapshot, or symbol lookup missed
    #[error("entry does not exist: {0}")]
    NotExistEntry(String),

    /// Registration attempted for an id or range that is already present
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Approximation level outside the configured set
    #[error("no such approximation level: {0}")]
    NoSuchApprox(u32),

    /// An operation that emits data was called before its callback was set
    #[error("callback not registered")]
    NotRegisterCallback,

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
