use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;
use zip::read::read_zipfile_from_stream;
use zip::result::ZipError;

use super::{ArchiveRequest, Backend, BackendKind, Password};
use crate::entry::{ArchiveEntry, EntryName, EntryResult, dedup_entries};
use crate::error::{Error, Result};
use crate::io::LocalFileReader;
use crate::sanitize;
use crate::zip::{CentralRecord, ZipParser};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// In-process backend: the central directory is read by [`ZipParser`],
/// entry data is decrypted and decompressed by the `zip` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn list(&self, request: &ArchiveRequest) -> Result<Vec<ArchiveEntry>> {
        let records = read_records(request).await?;
        Ok(entries_of(&records))
    }

    async fn test(&self, request: &ArchiveRequest) -> Result<Vec<EntryResult>> {
        let records = read_records(request).await?;
        let request = request.clone();
        run_blocking(move || Session::open(&request, &records)?.test()).await
    }

    async fn extract(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
        selection: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntryResult>> {
        let records = read_records(request).await?;
        let request = request.clone();
        let destination = destination.to_path_buf();
        let selection = selection.map(<[String]>::to_vec);
        let cancel = cancel.clone();
        run_blocking(move || {
            Session::open(&request, &records)?.extract(&destination, selection.as_deref(), &cancel)
        })
        .await
    }
}

async fn read_records(request: &ArchiveRequest) -> Result<Vec<CentralRecord>> {
    let reader = Arc::new(LocalFileReader::new(&request.archive)?);
    let records = ZipParser::new(reader).read_records().await?;
    debug!(archive = %request.archive.display(), records = records.len(), "read central directory");
    Ok(records)
}

fn entries_of(records: &[CentralRecord]) -> Vec<ArchiveEntry> {
    dedup_entries(
        records
            .iter()
            .enumerate()
            .map(|(index, record)| ArchiveEntry::from_record(record, index)),
    )
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))?
}

/// Failures that end the whole operation instead of a single entry.
fn aborts_operation(err: &Error) -> bool {
    err.kind().is_authentication()
}

/// Where the data of a listed entry is read from.
#[derive(Debug, Clone, Copy)]
enum Source {
    /// An entry the codec indexed.
    Indexed(usize),
    /// Local header offset of a record the codec dropped in favour of a
    /// later record with the same name.
    Shadowed(u64),
}

/// One open archive plus the listing it was matched against.
struct Session {
    archive: ZipArchive<BufReader<File>>,
    archive_path: PathBuf,
    password: Option<Password>,
    entries: Vec<ArchiveEntry>,
    /// Stored name bytes to data source, first record wins.
    sources: HashMap<Vec<u8>, Source>,
    protected_attempted: bool,
}

impl Session {
    fn open(request: &ArchiveRequest, records: &[CentralRecord]) -> Result<Self> {
        let file = File::open(&request.archive).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ArchiveNotFound {
                path: request.archive.clone(),
            },
            _ => Error::Io(e),
        })?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| Error::corrupt(e.to_string()))?;

        let mut by_offset = HashMap::new();
        let mut by_name = HashMap::new();
        for index in 0..archive.len() {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| Error::corrupt(e.to_string()))?;
            by_offset.insert(file.header_start(), index);
            by_name.entry(file.name_raw().to_vec()).or_insert(index);
        }

        let mut name_counts: HashMap<&[u8], usize> = HashMap::new();
        for record in records {
            *name_counts.entry(record.name_bytes.as_slice()).or_default() += 1;
        }

        let mut sources = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if record.is_directory() {
                continue;
            }
            let name = EntryName::for_record(&record.name_bytes, index);
            if sources.contains_key(name.as_bytes()) {
                continue;
            }
            let unique = name_counts.get(record.name_bytes.as_slice()) == Some(&1);
            // Offsets disagree when the archive has data prepended; unique
            // names can still be matched by their bytes.
            let source = match by_offset.get(&record.lfh_offset) {
                Some(&position) => Source::Indexed(position),
                None => match by_name.get(&record.name_bytes) {
                    Some(&position) if unique => Source::Indexed(position),
                    _ => Source::Shadowed(record.lfh_offset),
                },
            };
            sources.insert(name.as_bytes().to_vec(), source);
        }

        Ok(Self {
            archive,
            archive_path: request.archive.clone(),
            password: request.password.clone(),
            entries: entries_of(records),
            sources,
            protected_attempted: false,
        })
    }

    fn test(mut self) -> Result<Vec<EntryResult>> {
        let entries = std::mem::take(&mut self.entries);
        let never = CancellationToken::new();
        let mut results = Vec::with_capacity(entries.len());

        for entry in &entries {
            match self.decode(entry, &mut io::sink(), &never) {
                Ok(bytes) => {
                    debug!(entry = %entry.path, bytes, "entry ok");
                    results.push(EntryResult::ok(&entry.path));
                }
                Err(err) if aborts_operation(&err) => return Err(err),
                Err(err) => {
                    warn!(entry = %entry.path, error = %err, "entry failed verification");
                    results.push(EntryResult::failed(&entry.path, &err));
                }
            }
        }

        Ok(results)
    }

    fn extract(
        mut self,
        destination: &Path,
        selection: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntryResult>> {
        let targets: Vec<(String, Option<ArchiveEntry>)> = match selection {
            Some(paths) => paths
                .iter()
                .map(|path| {
                    let entry = self.entries.iter().find(|e| &e.path == path).cloned();
                    (path.clone(), entry)
                })
                .collect(),
            None => self
                .entries
                .iter()
                .map(|e| (e.path.clone(), Some(e.clone())))
                .collect(),
        };

        let mut results = Vec::with_capacity(targets.len());
        for (path, entry) in targets {
            if cancel.is_cancelled() {
                results.push(EntryResult::cancelled(path));
                continue;
            }
            let Some(entry) = entry else {
                results.push(EntryResult::failed(&path, &Error::EntryNotFound(path.clone())));
                continue;
            };

            match self.extract_entry(&entry, destination, cancel) {
                Ok(target) => {
                    debug!(entry = %entry.path, target = %target.display(), "extracted");
                    results.push(EntryResult::ok(path));
                }
                Err(err) if aborts_operation(&err) => return Err(err),
                Err(err) => {
                    warn!(entry = %entry.path, error = %err, "entry extraction failed");
                    results.push(EntryResult::failed(path, &err));
                }
            }
        }

        Ok(results)
    }

    fn extract_entry(
        &mut self,
        entry: &ArchiveEntry,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        // Raw names land on disk under their escaped rendering.
        let target = sanitize::entry_target(destination, &entry.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut out = File::create(&target).map_err(|source| Error::Write {
            path: target.clone(),
            source,
        })?;

        let result = self.decode(entry, &mut out, cancel).and_then(|_| {
            out.flush()?;
            Ok(())
        });
        drop(out);

        match result {
            Ok(()) => Ok(target),
            Err(err) => {
                let _ = fs::remove_file(&target);
                Err(match err {
                    Error::Io(source) => Error::Write {
                        path: target,
                        source,
                    },
                    other => other,
                })
            }
        }
    }

    /// Decode one entry into `out`, classifying any failure.
    ///
    /// Read-side failures come back as `CorruptArchive` (or an
    /// authentication error); write-side failures as `Error::Io`.
    fn decode<W: Write>(
        &mut self,
        entry: &ArchiveEntry,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let Some(&source) = self.sources.get(entry.name.as_bytes()) else {
            return Err(Error::EntryNotFound(entry.path.clone()));
        };

        // Some containers can only be diagnosed by trying the first protected entry.
        let first_protected = entry.encrypted && !self.protected_attempted;
        if entry.encrypted {
            self.protected_attempted = true;
        }

        let password = self.password.as_ref();
        if entry.encrypted && password.is_none() {
            return Err(Error::PasswordRequired {
                entry: entry.path.clone(),
            });
        }

        let result = match source {
            Source::Indexed(index) => {
                let opened = match password {
                    Some(password) if entry.encrypted => {
                        self.archive.by_index_decrypt(index, password.as_bytes())
                    }
                    _ => self.archive.by_index(index),
                };
                match opened {
                    Ok(mut file) => copy_entry(&mut file, out, cancel, &entry.path),
                    Err(err) => Err(classify_open_error(err, entry, password.is_some())),
                }
            }
            Source::Shadowed(offset) => {
                debug!(entry = %entry.path, offset, "decoding shadowed duplicate from its local header");
                decode_at(&self.archive_path, offset, entry, out, cancel, password.is_some())
            }
        };

        match result {
            Err(Error::CorruptArchive { reason }) if first_protected && password.is_some() => {
                debug!(entry = %entry.path, %reason, "first protected entry failed to decode");
                Err(Error::WrongPassword)
            }
            other => other,
        }
    }
}

fn classify_open_error(err: ZipError, entry: &ArchiveEntry, password_supplied: bool) -> Error {
    match err {
        ZipError::InvalidPassword => Error::WrongPassword,
        ZipError::UnsupportedArchive(detail) if detail == ZipError::PASSWORD_REQUIRED => {
            if password_supplied {
                Error::WrongPassword
            } else {
                Error::PasswordRequired {
                    entry: entry.path.clone(),
                }
            }
        }
        ZipError::UnsupportedArchive(_) => Error::UnsupportedMethod(entry.effective_method()),
        ZipError::FileNotFound => Error::EntryNotFound(entry.path.clone()),
        other => Error::corrupt(format!("{}: {other}", entry.path)),
    }
}

/// Stream one entry starting at its local header.
///
/// The streaming reader cannot decrypt, so encrypted records reached this
/// way report `UnsupportedMethod`.
fn decode_at<W: Write>(
    archive: &Path,
    offset: u64,
    entry: &ArchiveEntry,
    out: &mut W,
    cancel: &CancellationToken,
    password_supplied: bool,
) -> Result<u64> {
    let unreadable = |e: io::Error| Error::corrupt(format!("{}: {e}", entry.path));
    let mut file = File::open(archive).map_err(unreadable)?;
    file.seek(SeekFrom::Start(offset)).map_err(unreadable)?;
    let mut reader = BufReader::new(file);

    match read_zipfile_from_stream(&mut reader) {
        Ok(Some(mut data)) => copy_entry(&mut data, out, cancel, &entry.path),
        Ok(None) => Err(Error::corrupt(format!(
            "{}: no local header at offset {offset}",
            entry.path
        ))),
        Err(err) => Err(classify_open_error(err, entry, password_supplied)),
    }
}

/// Copy decoded bytes, checking for cancellation between chunks.
fn copy_entry<R: Read, W: Write>(
    reader: &mut R,
    out: &mut W,
    cancel: &CancellationToken,
    path: &str,
) -> Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::corrupt(format!("{path}: {e}"))),
        };
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
}
