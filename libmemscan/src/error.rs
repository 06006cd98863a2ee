//! Typed error taxonomy for the scanning engine.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("no such process: {pid}")]
    NoSuchProcess { pid: i32 },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("failed to compile regex: {source}")]
    RegexCompile {
        #[from]
        source: regex::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ScanError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ScanError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ScanError::Internal {
            message: message.into(),
        }
    }

    /// Classify an I/O failure against a procfs path, distinguishing the
    /// taxonomy's `NoSuchProcess`/`PermissionDenied` cases from a bare `Io`.
    pub fn from_proc_io(pid: i32, path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => ScanError::NoSuchProcess { pid },
            std::io::ErrorKind::PermissionDenied => ScanError::PermissionDenied { path },
            _ => ScanError::Io { source },
        }
    }
}
