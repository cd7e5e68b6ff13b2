use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::zip::CompressionMethod;

/// Stable classification of a failure, independent of which backend saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BackendUnavailable,
    ArchiveNotFound,
    CorruptArchive,
    PasswordRequired,
    WrongPassword,
    EntryNotFound,
    UnsupportedMethod,
    ToolExecutionError,
    OperationTimedOut,
    PartialExtractionFailure,
    Cancelled,
    Io,
}

impl ErrorKind {
    /// Failures caused by the credentials rather than the archive or backend.
    ///
    /// These are never retried with another backend.
    pub fn is_authentication(self) -> bool {
        matches!(self, ErrorKind::WrongPassword | ErrorKind::PasswordRequired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BackendUnavailable => "backend unavailable",
            ErrorKind::ArchiveNotFound => "archive not found",
            ErrorKind::CorruptArchive => "corrupt archive",
            ErrorKind::PasswordRequired => "password required",
            ErrorKind::WrongPassword => "wrong password",
            ErrorKind::EntryNotFound => "entry not found",
            ErrorKind::UnsupportedMethod => "unsupported method",
            ErrorKind::ToolExecutionError => "tool execution error",
            ErrorKind::OperationTimedOut => "operation timed out",
            ErrorKind::PartialExtractionFailure => "partial extraction failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "i/o error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{backend} backend is not available")]
    BackendUnavailable { backend: BackendKind },

    #[error("archive not found: {}", .path.display())]
    ArchiveNotFound { path: PathBuf },

    #[error("corrupt archive: {reason}")]
    CorruptArchive { reason: String },

    #[error("password required to read '{entry}'")]
    PasswordRequired { entry: String },

    #[error("wrong password")]
    WrongPassword,

    #[error("entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedMethod(CompressionMethod),

    #[error("archive tool exited with {}: {diagnostic}", exit_label(.code))]
    ToolExecution { code: Option<i32>, diagnostic: String },

    #[error("operation timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to write '{}': {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status".to_string(),
    }
}

impl Error {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptArchive {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Error::ArchiveNotFound { .. } => ErrorKind::ArchiveNotFound,
            Error::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            Error::PasswordRequired { .. } => ErrorKind::PasswordRequired,
            Error::WrongPassword => ErrorKind::WrongPassword,
            Error::EntryNotFound(_) => ErrorKind::EntryNotFound,
            Error::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            Error::ToolExecution { .. } => ErrorKind::ToolExecutionError,
            Error::TimedOut(_) => ErrorKind::OperationTimedOut,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Write { .. } | Error::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
