use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between an event log on disk and a report.
#[derive(Debug, Error)]
pub enum Error {
    /// A run directory, event file, table or config file does not exist.
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    /// None of the requested tags exist in the source.
    #[error(
        "no matching scalar tags found in {}: requested {requested:?}, available tags: {available:?}",
        source_path.display()
    )]
    NoMatchingTags {
        source_path: PathBuf,
        requested: Vec<String>,
        available: Vec<String>,
    },

    /// Input exists but lacks data an operation needs, or is structurally broken.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The caller asked for something impossible before any I/O happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    /// Drawing backend failure while rendering a chart.
    #[error("plot error: {0}")]
    Plot(String),
}

impl Error {
    pub(crate) fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Error::NotFound {
            what,
            path: path.into(),
        }
    }
}
