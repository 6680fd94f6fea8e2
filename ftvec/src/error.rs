//! Error and result types.

use std::io;
use std::process::ExitStatus;

use ndarray::ShapeError;
use thiserror::Error;

/// `Result` type alias for operations that can fail with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors in training, reading, writing, or querying embeddings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid file format.
    #[error("{0}")]
    Format(String),

    /// Invalid training parameters or trainer preconditions.
    #[error("{0}")]
    Config(String),

    /// `ndarray` shape error.
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// A stored size does not fit the native word size.
    #[error("Value does not fit in native word size")]
    Overflow,

    /// One or more query tokens have no embedding.
    #[error("No embedding for: {}", .words.join(", "))]
    MissingWords {
        /// The tokens without an embedding.
        words: Vec<String>,
    },

    /// The trainer binary could not be run.
    #[error("{desc}: {error}")]
    Process {
        desc: String,
        #[source]
        error: io::Error,
    },

    /// The trainer exited with a non-zero status.
    #[error("fastText exited with {status}: {stderr}")]
    TrainingFailed {
        status: ExitStatus,
        /// Tail of the trainer's standard error output.
        stderr: String,
    },

    /// I/O error while reading.
    #[error("{desc}: {error}")]
    Read {
        desc: String,
        #[source]
        error: io::Error,
    },

    /// I/O error while writing.
    #[error("{desc}: {error}")]
    Write {
        desc: String,
        #[source]
        error: io::Error,
    },
}

impl Error {
    pub(crate) fn read_error(desc: impl Into<String>, error: io::Error) -> Self {
        Error::Read {
            desc: desc.into(),
            error,
        }
    }

    pub(crate) fn write_error(desc: impl Into<String>, error: io::Error) -> Self {
        Error::Write {
            desc: desc.into(),
            error,
        }
    }
}
