//! Executable lookup.
//!
//! Resolves a bare program name against `PATH` the way a shell does, or
//! checks an explicit path. Absence is reported as `None`; turning that into
//! an error is the caller's business.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Locate an executable by name or path using the current `PATH`.
pub fn find_executable(name: impl AsRef<Path>) -> Option<PathBuf> {
    let search_path = std::env::var_os("PATH").unwrap_or_default();
    find_executable_in(name, &search_path)
}

/// Locate an executable using an explicit `PATH`-style search path.
///
/// Names containing a path separator are checked as given and never
/// searched for.
pub fn find_executable_in(name: impl AsRef<Path>, search_path: &OsStr) -> Option<PathBuf> {
    let name = name.as_ref();

    if name.as_os_str().is_empty() {
        return None;
    }

    if has_separator(name) {
        let found = is_executable(name).then(|| name.to_path_buf());
        tracing::debug!(path = %name.display(), found = found.is_some(), "checked explicit executable path");
        return found;
    }

    let found = std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate));

    match &found {
        Some(path) => tracing::debug!(name = %name.display(), path = %path.display(), "resolved executable"),
        None => tracing::debug!(name = %name.display(), "executable not found on PATH"),
    }

    found
}

fn has_separator(name: &Path) -> bool {
    name.as_os_str()
        .as_encoded_bytes()
        .iter()
        .any(|&b| std::path::is_separator(char::from(b)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_find_system_ls() {
        let path = find_executable("ls").expect("ls should be on PATH");
        assert!(path.is_absolute());
        assert!(path.ends_with("ls"));
    }

    #[test]
    fn test_missing_name() {
        assert_eq!(find_executable("nonexistent_command_12345"), None);
        assert_eq!(find_executable(""), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_search_order_and_permissions() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        write_file(first.path(), "tool", 0o644);
        let expected = write_file(second.path(), "tool", 0o755);

        let search_path: OsString =
            std::env::join_paths([first.path(), second.path()]).unwrap();

        assert_eq!(find_executable_in("tool", &search_path), Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn test_first_match_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        let expected = write_file(first.path(), "tool", 0o755);
        write_file(second.path(), "tool", 0o755);

        let search_path: OsString =
            std::env::join_paths([first.path(), second.path()]).unwrap();

        assert_eq!(find_executable_in("tool", &search_path), Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn test_explicit_path_is_not_searched() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "script.sh", 0o755);
        let plain = write_file(dir.path(), "plain.txt", 0o644);

        assert_eq!(
            find_executable_in(&script, OsStr::new("")),
            Some(script.clone())
        );
        assert_eq!(find_executable_in(&plain, OsStr::new("")), None);
        // A directory is never an executable, even with x bits set.
        assert_eq!(find_executable_in(dir.path(), OsStr::new("")), None);
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("tool")).unwrap();

        assert_eq!(find_executable_in("tool", dir.path().as_os_str()), None);
    }
}
