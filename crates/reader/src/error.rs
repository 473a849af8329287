use std::path::PathBuf;
use thiserror::Error;

use crate::filter::FilterError;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Log file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    InvalidPattern(#[from] FilterError),

    #[error("I/O error while reading log file: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    /// Classify an error returned while opening `path`.
    pub(crate) fn from_open(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ReaderError::NotFound(path.to_path_buf()),
            _ => ReaderError::Io(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReaderError::NotFound(_))
    }
}

impl From<ReaderError> for std::io::Error {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::Io(e) => e,
            ReaderError::NotFound(path) => std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("log file not found: {}", path.display()),
            ),
            ReaderError::InvalidPattern(e) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
            }
        }
    }
}
