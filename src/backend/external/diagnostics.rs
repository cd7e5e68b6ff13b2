use std::collections::HashMap;

use crate::error::{Error, ErrorKind};

/// Phrases 7-Zip prints when the supplied password does not open the data.
const PASSWORD_PHRASES: &[&str] = &[
    "Wrong password",
    "Cannot open encrypted archive",
    "Can not open encrypted archive",
];

/// Printed when no password was given and stdin is closed.
const PASSWORD_PROMPT: &str = "Enter password";

/// Reasons 7-Zip reports for a single damaged entry.
const ENTRY_REASONS: &[&str] = &[
    "CRC Failed",
    "Data Error",
    "Unsupported Method",
    "Unexpected end of data",
    "Headers Error",
];

/// A failure the tool attributed to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub kind: ErrorKind,
    pub reason: String,
}

/// Map a non-zero exit to an error.
pub fn classify(code: Option<i32>, diagnostic: &str, password_supplied: bool) -> Error {
    let password_problem = PASSWORD_PHRASES.iter().any(|p| diagnostic.contains(p));
    if password_problem && password_supplied {
        return Error::WrongPassword;
    }
    if !password_supplied && (password_problem || diagnostic.contains(PASSWORD_PROMPT)) {
        let entry = failed_entries(diagnostic)
            .into_keys()
            .next()
            .unwrap_or_default();
        return Error::PasswordRequired { entry };
    }

    Error::ToolExecution {
        code,
        diagnostic: diagnostic.to_string(),
    }
}

/// Entries named in `ERROR: <reason> : <path>` lines.
pub fn failed_entries(diagnostic: &str) -> HashMap<String, EntryFailure> {
    diagnostic
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (tagged, rest) = match line.strip_prefix("ERROR:") {
                Some(rest) => (true, rest.trim()),
                None => (false, line),
            };
            let (reason, path) = rest.rsplit_once(" : ")?;
            let reason = reason.trim();
            if !tagged && !ENTRY_REASONS.iter().any(|r| reason.starts_with(r)) {
                return None;
            }
            let kind = if reason.contains("Unsupported Method") {
                ErrorKind::UnsupportedMethod
            } else {
                ErrorKind::CorruptArchive
            };
            Some((
                normalize(path.trim()),
                EntryFailure {
                    kind,
                    reason: reason.to_string(),
                },
            ))
        })
        .collect()
}

#[cfg(windows)]
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(not(windows))]
pub fn normalize(path: &str) -> String {
    path.to_string()
}
