use crate::backend::BackendKind;
use crate::entry::{ArchiveEntry, EntryResult};
use crate::error::ErrorKind;

/// What an engine operation produced, and which backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub backend_used: BackendKind,
    pub payload: T,
    /// Set when the operation as a whole did not succeed.
    pub error: Option<ErrorKind>,
    /// Kind of the first backend's failure when another backend took over.
    pub fallback: Option<ErrorKind>,
}

pub type ListOutcome = Outcome<Vec<ArchiveEntry>>;
pub type TestOutcome = Outcome<Vec<EntryResult>>;
pub type ExtractOutcome = Outcome<Vec<EntryResult>>;

impl<T> Outcome<T> {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl Outcome<Vec<EntryResult>> {
    pub fn passed(&self) -> impl Iterator<Item = &EntryResult> {
        self.payload.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &EntryResult> {
        self.payload.iter().filter(|r| !r.success)
    }
}
