use std::path::PathBuf;

use thiserror::Error;

/// The crate's error taxonomy, one variant per kind in the design's
/// error-handling section. `main` maps these onto process exit codes.
#[derive(Error, Debug)]
pub enum FqError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("accession not found or invalid: {0}")]
    AccessionNotFound(PathBuf),

    #[error("archive read failed: {0}")]
    Source(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("resource exhausted: {0}")]
    Resource(String),

    #[error("cancelled by user interrupt")]
    Cancelled,

    #[error("write to output failed: {0}")]
    Downstream(#[from] std::io::Error),
}

pub type FqResult<T> = Result<T, FqError>;
