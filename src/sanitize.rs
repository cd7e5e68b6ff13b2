use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve an archive entry path to a location under `destination`.
///
/// Leading `/` and drive prefixes are rejected, `..` may not climb above the
/// destination, and `.` components are dropped.
pub fn entry_target(destination: &Path, entry_path: &str) -> Result<PathBuf> {
    let relative = normalize_entry_path(entry_path)?;
    Ok(destination.join(relative))
}

fn normalize_entry_path(entry_path: &str) -> Result<PathBuf> {
    let unsafe_path = || Error::corrupt(format!("entry path escapes destination: {entry_path}"));

    if entry_path.contains('\0') {
        return Err(Error::corrupt("entry path contains a null byte"));
    }

    let mut result = PathBuf::new();
    for component in Path::new(entry_path).components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    return Err(unsafe_path());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_path()),
        }
    }

    if result.as_os_str().is_empty() {
        return Err(Error::corrupt(format!("entry path is empty: {entry_path:?}")));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_path_resolves_under_destination() {
        let target = entry_target(Path::new("/out"), "b/c.txt").unwrap();
        assert_eq!(target, Path::new("/out/b/c.txt"));
    }

    #[test]
    fn inner_parent_components_collapse() {
        let target = entry_target(Path::new("/out"), "a/./b/../c.txt").unwrap();
        assert_eq!(target, Path::new("/out/a/c.txt"));
    }

    #[test]
    fn escaping_paths_rejected() {
        for bad in ["../evil.txt", "a/../../evil.txt", "/etc/passwd"] {
            let err = entry_target(Path::new("/out"), bad).unwrap_err();
            assert!(matches!(err, Error::CorruptArchive { .. }), "{bad}");
        }
    }

    #[test]
    fn empty_path_rejected() {
        assert!(entry_target(Path::new("/out"), "./").is_err());
    }

    #[test]
    fn escaped_names_are_usable() {
        let target = entry_target(Path::new("/out"), "caf%E9.txt").unwrap();
        assert_eq!(target, Path::new("/out/caf%E9.txt"));
    }
}
