use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input file does not exist: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("input file has no header line: {}", path.display())]
    EmptyInput { path: PathBuf },

    #[error("{}: header is missing required column `{column}`", path.display())]
    MalformedHeader { path: PathBuf, column: &'static str },

    /// `line` is the line number in the original input, not in a part file.
    #[error("{}:{line}: malformed record: {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{task} failed: {message}")]
    Worker { task: String, message: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
