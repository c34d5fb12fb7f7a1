use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type.
///
/// `Config` errors are raised while a run is being set up and never from
/// inside the epoch loop. `Divergence` aborts the run. `BackendUnavailable`
/// is recovered inside the augmentation pipeline and never reaches callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("loss diverged at epoch {epoch}, batch {batch}: {loss}")]
    Divergence { epoch: usize, batch: usize, loss: f64 },

    #[error("colour-space backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("prefetch worker stopped: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json { path: path.into(), source }
    }
}
