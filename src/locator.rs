//! Finding a 7-Zip compatible executable on the host.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Path to an archive tool that was found to exist and be executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPath(PathBuf);

impl ToolPath {
    /// Wrap a path without probing it; the backend reports a failure to
    /// start the process if it is not runnable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ToolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

#[cfg(windows)]
const WELL_KNOWN: &[&str] = &[
    r"C:\Program Files\7-Zip\7z.exe",
    r"C:\Program Files (x86)\7-Zip\7z.exe",
    r"C:\Tools\7-Zip\7z.exe",
];

#[cfg(not(windows))]
const WELL_KNOWN: &[&str] = &["/usr/bin/7z", "/usr/local/bin/7z", "/opt/homebrew/bin/7z"];

const PATH_NAMES: &[&str] = &["7z", "7zz", "7za"];

static LOCATED: OnceLock<Option<ToolPath>> = OnceLock::new();

/// Ordered search: fixed install locations first, then the executable
/// search path.
#[derive(Debug, Clone)]
pub struct Locator {
    candidates: Vec<PathBuf>,
    names: Vec<String>,
}

impl Locator {
    /// Search order used by [`locate`].
    pub fn system() -> Self {
        Self {
            candidates: WELL_KNOWN.iter().map(PathBuf::from).collect(),
            names: PATH_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn new(candidates: Vec<PathBuf>, names: Vec<String>) -> Self {
        Self { candidates, names }
    }

    /// First candidate that exists and is executable. Never fails.
    pub fn search(&self) -> Option<ToolPath> {
        let found = self
            .candidates
            .iter()
            .find(|path| is_executable(path))
            .cloned()
            .or_else(|| {
                self.names
                    .iter()
                    .find_map(|name| which::which(name).ok())
                    .filter(|path| is_executable(path))
            })
            .map(ToolPath);

        match &found {
            Some(tool) => debug!(tool = %tool, "located archive tool"),
            None => debug!("no archive tool found"),
        }
        found
    }
}

/// Locate the archive tool once per process and cache the answer.
pub fn locate() -> Option<&'static ToolPath> {
    LOCATED.get_or_init(|| Locator::system().search()).as_ref()
}

/// Probe again, ignoring the cached answer. The cache is left untouched.
pub fn refresh() -> Option<ToolPath> {
    Locator::system().search()
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
