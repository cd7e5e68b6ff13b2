use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::zip::{CentralRecord, CompressionMethod};

/// An archive-internal name, decoded when possible.
///
/// ZIP names carry no reliable encoding marker, so a stored name that is not
/// UTF-8 is kept as bytes alongside an escaped rendering. Invalid bytes
/// render as `%XX` and a literal `%` as `%25`, so distinct byte strings
/// never share a rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryName {
    Decoded(String),
    Raw { bytes: Vec<u8>, escaped: String },
}

impl EntryName {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(name) => EntryName::Decoded(name.to_string()),
            Err(_) => EntryName::Raw {
                bytes: bytes.to_vec(),
                escaped: escape_invalid(bytes),
            },
        }
    }

    /// Name of the `index`-th record, with a placeholder for empty names.
    pub fn for_record(bytes: &[u8], index: usize) -> Self {
        if bytes.is_empty() {
            return EntryName::Decoded(format!("unnamed-{index}"));
        }
        Self::from_bytes(bytes)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntryName::Decoded(name) => name,
            EntryName::Raw { escaped, .. } => escaped,
        }
    }

    /// Stored bytes for raw names, UTF-8 bytes otherwise.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EntryName::Decoded(name) => name.as_bytes(),
            EntryName::Raw { bytes, .. } => bytes,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, EntryName::Raw { .. })
    }
}

fn escape_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 8);
    for chunk in bytes.utf8_chunks() {
        for ch in chunk.valid().chars() {
            match ch {
                '%' => out.push_str("%25"),
                ch => out.push(ch),
            }
        }
        for byte in chunk.invalid() {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file inside an archive, as reported by either backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Forward-slash separated, never empty.
    pub path: String,
    pub name: EntryName,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub method: CompressionMethod,
    /// Compression applied under AES encryption, when known.
    pub aes_method: Option<CompressionMethod>,
    /// `None` when the archive carries no usable timestamp.
    pub modified: Option<NaiveDateTime>,
    pub encrypted: bool,
    pub crc32: Option<u32>,
}

impl ArchiveEntry {
    pub fn from_record(record: &CentralRecord, index: usize) -> Self {
        let name = EntryName::for_record(&record.name_bytes, index);
        Self {
            path: name.as_str().to_string(),
            name,
            uncompressed_size: record.uncompressed_size,
            compressed_size: record.compressed_size,
            method: record.compression_method,
            aes_method: record.aes_inner_method,
            modified: record.modified(),
            encrypted: record.is_encrypted(),
            crc32: Some(record.crc32),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }

    /// The method that actually compressed the data.
    pub fn effective_method(&self) -> CompressionMethod {
        self.aes_method.unwrap_or(self.method)
    }

    /// `AES (Deflate)` for encrypted entries whose inner method is known.
    pub fn method_label(&self) -> String {
        match (self.method, self.aes_method) {
            (CompressionMethod::Aes, Some(inner)) => format!("AES ({})", inner.name()),
            (method, _) => method.name(),
        }
    }

    pub fn modified_label(&self) -> String {
        match self.modified {
            Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
            None => "Unknown".to_string(),
        }
    }
}

/// Drop directory markers and repeated names; the first occurrence wins.
pub fn dedup_entries(entries: impl IntoIterator<Item = ArchiveEntry>) -> Vec<ArchiveEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| !e.is_directory())
        .filter(|e| seen.insert(e.name.as_bytes().to_vec()))
        .collect()
}

/// Per-entry result of a test or extract run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryResult {
    pub path: String,
    pub success: bool,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl EntryResult {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: true,
            error: None,
            message: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: &Error) -> Self {
        Self::failed_with(path, error.kind(), error.to_string())
    }

    pub fn failed_with(path: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: false,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn cancelled(path: impl Into<String>) -> Self {
        Self::failed(path, &Error::Cancelled)
    }
}
