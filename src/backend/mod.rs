//! Backends that can list, test and extract a ZIP archive.
//!
//! Two implementations exist: [`NativeBackend`] decodes the archive in
//! process, [`ExternalBackend`] drives a 7-Zip compatible command line tool.
//! Both report entries and per-entry results in the same shapes so the
//! engine can switch between them without the caller noticing.

mod external;
mod native;

pub use external::ExternalBackend;
pub use native::NativeBackend;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::entry::{ArchiveEntry, EntryResult};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Native,
    External,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => f.write_str("native"),
            BackendKind::External => f.write_str("external"),
        }
    }
}

/// Archive password. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTF-8 bytes, which is what both AES key derivation and 7-Zip use.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// The archive an operation targets and the credentials to open it with.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub archive: PathBuf,
    pub password: Option<Password>,
}

impl ArchiveRequest {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            password: None,
        }
    }

    /// Empty passwords count as no password.
    pub fn with_password(mut self, password: Option<impl Into<String>>) -> Self {
        self.password = password
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .map(Password::new);
        self
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Entries of the archive, directories and repeated paths removed.
    async fn list(&self, request: &ArchiveRequest) -> Result<Vec<ArchiveEntry>>;

    /// Verify every entry without writing anything.
    async fn test(&self, request: &ArchiveRequest) -> Result<Vec<EntryResult>>;

    /// Extract `selection` (or everything) below `destination`.
    ///
    /// Per-entry problems are folded into the returned results; only
    /// failures that make the whole run meaningless are returned as `Err`.
    /// Entries left unprocessed because of `cancel` are reported as cancelled.
    async fn extract(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
        selection: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntryResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_debug_is_redacted() {
        let request = ArchiveRequest::new("a.zip").with_password(Some("hunter2"));
        assert!(!format!("{request:?}").contains("hunter2"));
        assert_eq!(request.password.unwrap().as_str(), "hunter2");
    }

    #[test]
    fn empty_password_is_none() {
        let request = ArchiveRequest::new("a.zip").with_password(Some(""));
        assert!(request.password.is_none());
    }
}
