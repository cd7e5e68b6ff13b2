//! Backend driving a 7-Zip compatible command line tool.
//!
//! The password is passed as a `-p` argument, which makes it visible to
//! other local users through the process table while the tool runs.

mod diagnostics;
mod listing;
mod process;

use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ArchiveRequest, Backend, BackendKind};
use crate::entry::{ArchiveEntry, EntryResult};
use crate::error::{Error, ErrorKind, Result};
use crate::locator::ToolPath;
use crate::sanitize;
use process::{Limit, ToolOutput};

#[derive(Debug, Clone)]
pub struct ExternalBackend {
    tool: ToolPath,
    timeout: Duration,
}

impl ExternalBackend {
    /// `timeout` bounds listing and testing; extraction runs until done
    /// or cancelled.
    pub fn new(tool: ToolPath, timeout: Duration) -> Self {
        Self { tool, timeout }
    }

    pub fn tool(&self) -> &ToolPath {
        &self.tool
    }

    /// `<command> <switches> [-p<password>] -- <archive> <operands>`
    fn args(
        request: &ArchiveRequest,
        command: &str,
        switches: &[OsString],
        operands: &[&str],
    ) -> Vec<OsString> {
        let mut args = vec![OsString::from(command)];
        args.extend(switches.iter().cloned());
        if let Some(password) = &request.password {
            args.push(OsString::from(format!("-p{}", password.as_str())));
        }
        args.push(OsString::from("--"));
        args.push(request.archive.clone().into_os_string());
        args.extend(operands.iter().map(OsString::from));
        args
    }

    fn output_switch(destination: &Path) -> OsString {
        let mut switch = OsString::from("-o");
        switch.push(destination.as_os_str());
        switch
    }

    fn failure(request: &ArchiveRequest, output: &ToolOutput) -> Error {
        diagnostics::classify(
            output.code(),
            &output.diagnostic(),
            request.password.is_some(),
        )
    }

    async fn extract_each(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
        entries: &[ArchiveEntry],
        selection: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<EntryResult>> {
        let switches = [
            OsString::from("-y"),
            OsString::from("-spd"),
            Self::output_switch(destination),
        ];
        let mut results = Vec::with_capacity(selection.len());

        for path in selection {
            if cancel.is_cancelled() {
                results.push(EntryResult::cancelled(path));
                continue;
            }
            if !entries.iter().any(|e| &e.path == path) {
                results.push(EntryResult::failed(path, &Error::EntryNotFound(path.clone())));
                continue;
            }
            let target = sanitize::entry_target(destination, path);

            let args = Self::args(request, "x", &switches, &[path.as_str()]);
            let output = match process::run(&self.tool, &args, Limit::Cancel(cancel)).await {
                Ok(output) => output,
                Err(Error::Cancelled) => {
                    if let Ok(target) = &target {
                        let _ = fs::remove_file(target);
                    }
                    results.push(EntryResult::cancelled(path));
                    continue;
                }
                Err(err) => return Err(err),
            };

            if output.success() {
                match &target {
                    Ok(target) if target.is_file() => results.push(EntryResult::ok(path)),
                    Ok(_) => results.push(EntryResult::failed_with(
                        path,
                        ErrorKind::ToolExecutionError,
                        "archive tool reported success but wrote no file",
                    )),
                    Err(err) => results.push(EntryResult::failed(path, err)),
                }
                continue;
            }

            let err = Self::failure(request, &output);
            if err.kind().is_authentication() {
                return Err(err);
            }
            let diagnostic = output.diagnostic();
            warn!(entry = %path, code = ?output.code(), "archive tool failed to extract entry");
            let result = match diagnostics::failed_entries(&diagnostic).remove(path) {
                Some(failure) => EntryResult::failed_with(path, failure.kind, failure.reason),
                None => EntryResult::failed(path, &err),
            };
            if let Ok(target) = &target {
                let _ = fs::remove_file(target);
            }
            results.push(result);
        }

        Ok(results)
    }

    async fn extract_all(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
        entries: &[ArchiveEntry],
        cancel: &CancellationToken,
    ) -> Result<Vec<EntryResult>> {
        let switches = [OsString::from("-y"), Self::output_switch(destination)];
        let args = Self::args(request, "x", &switches, &[]);

        let output = match process::run(&self.tool, &args, Limit::Cancel(cancel)).await {
            Ok(output) => output,
            Err(Error::Cancelled) => return Ok(cancelled_results(destination, entries)),
            Err(err) => return Err(err),
        };

        let failures = if output.success() {
            HashMap::new()
        } else {
            let err = Self::failure(request, &output);
            let failures = diagnostics::failed_entries(&output.diagnostic());
            if err.kind().is_authentication() || failures.is_empty() {
                return Err(err);
            }
            failures
        };

        Ok(entries
            .iter()
            .map(|entry| {
                let target = match sanitize::entry_target(destination, &entry.path) {
                    Ok(target) => target,
                    Err(err) => return EntryResult::failed(&entry.path, &err),
                };
                if let Some(failure) = failures.get(&entry.path) {
                    let _ = fs::remove_file(&target);
                    return EntryResult::failed_with(&entry.path, failure.kind, &failure.reason);
                }
                if target.is_file() {
                    EntryResult::ok(&entry.path)
                } else {
                    EntryResult::failed_with(
                        &entry.path,
                        ErrorKind::ToolExecutionError,
                        "archive tool did not write this entry",
                    )
                }
            })
            .collect())
    }
}

/// Results after a whole-archive run was killed: only files that reached
/// their full size count as extracted.
fn cancelled_results(destination: &Path, entries: &[ArchiveEntry]) -> Vec<EntryResult> {
    entries
        .iter()
        .map(|entry| {
            let Ok(target) = sanitize::entry_target(destination, &entry.path) else {
                return EntryResult::cancelled(&entry.path);
            };
            match fs::metadata(&target) {
                Ok(meta) if meta.is_file() && meta.len() == entry.uncompressed_size => {
                    EntryResult::ok(&entry.path)
                }
                Ok(_) => {
                    let _ = fs::remove_file(&target);
                    EntryResult::cancelled(&entry.path)
                }
                Err(_) => EntryResult::cancelled(&entry.path),
            }
        })
        .collect()
}

#[async_trait]
impl Backend for ExternalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::External
    }

    async fn list(&self, request: &ArchiveRequest) -> Result<Vec<ArchiveEntry>> {
        let args = Self::args(request, "l", &[OsString::from("-slt")], &[]);
        let output = process::run(&self.tool, &args, Limit::Timeout(self.timeout)).await?;
        if !output.success() {
            return Err(Self::failure(request, &output));
        }
        let entries = listing::parse_listing(&output.stdout);
        debug!(archive = %request.archive.display(), entries = entries.len(), "archive tool listing");
        Ok(entries)
    }

    async fn test(&self, request: &ArchiveRequest) -> Result<Vec<EntryResult>> {
        let args = Self::args(request, "t", &[], &[]);
        let output = process::run(&self.tool, &args, Limit::Timeout(self.timeout)).await?;

        if output.success() {
            let entries = self.list(request).await?;
            return Ok(entries.iter().map(|e| EntryResult::ok(&e.path)).collect());
        }

        let err = Self::failure(request, &output);
        if err.kind().is_authentication() {
            return Err(err);
        }
        let failures = diagnostics::failed_entries(&output.diagnostic());
        if failures.is_empty() {
            return Err(err);
        }

        let entries = self.list(request).await?;
        Ok(entries
            .iter()
            .map(|entry| match failures.get(&entry.path) {
                Some(failure) => EntryResult::failed_with(&entry.path, failure.kind, &failure.reason),
                None => EntryResult::ok(&entry.path),
            })
            .collect())
    }

    async fn extract(
        &self,
        request: &ArchiveRequest,
        destination: &Path,
        selection: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EntryResult>> {
        let entries = self.list(request).await?;
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|source| Error::Write {
                path: destination.to_path_buf(),
                source,
            })?;

        match selection {
            Some(paths) => {
                self.extract_each(request, destination, &entries, paths, cancel)
                    .await
            }
            None => self.extract_all(request, destination, &entries, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_end_switches_before_archive() {
        let request = ArchiveRequest::new("/tmp/-odd.zip").with_password(Some("pw"));
        let args = ExternalBackend::args(&request, "x", &[OsString::from("-y")], &["a.txt"]);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["x", "-y", "-ppw", "--", "/tmp/-odd.zip", "a.txt"]);
    }

    #[test]
    fn no_password_no_switch() {
        let request = ArchiveRequest::new("a.zip");
        let args = ExternalBackend::args(&request, "t", &[], &[]);
        assert!(!args.iter().any(|a| a.to_string_lossy().starts_with("-p")));
    }

    #[test]
    fn output_switch_is_attached() {
        let switch = ExternalBackend::output_switch(Path::new("/tmp/out"));
        assert_eq!(switch, OsString::from("-o/tmp/out"));
    }
}
