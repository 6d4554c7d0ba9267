use std::path::PathBuf;

use thiserror::Error;

/// Errors that can surface while ingesting metadata and manifests
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read spreadsheet {path}: {source}")]
    Spreadsheet {
        path: PathBuf,
        source: calamine::XlsxError,
    },

    #[error("spreadsheet {0} has no worksheet")]
    EmptyWorkbook(PathBuf),

    #[error("spreadsheet {path} has no header row at index {row}")]
    MissingHeader { path: PathBuf, row: usize },

    #[error("{path}, row {row}: {field} value [{value}] is not an integer")]
    InvalidInteger {
        path: PathBuf,
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} matches more than one record")]
    Ambiguous(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Database(#[from] postgres::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
