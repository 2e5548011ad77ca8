//! Filesystem helpers shared by the element cache and the feature store.
//!
//! Built on `cap-std` and `camino`: paths are UTF-8 and directory access
//! goes through capability handles resolved from ambient authority once,
//! at the call boundary.

#![forbid(unsafe_code)]

use std::io;
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

/// Ensure a working directory exists, creating missing ancestors.
pub fn ensure_dir(path: &Utf8Path) -> io::Result<()> {
    if path.as_os_str().is_empty() || path == Utf8Path::new("/") {
        return Ok(());
    }
    let (base_dir, relative) = base_dir_and_relative(path)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)?;
    Ok(())
}

/// Ensure the parent directory for `path` exists.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// Remove a file if it exists; absent files are not an error.
///
/// Used when a fresh import discards the previous cache database.
pub fn remove_file_if_exists(path: &Utf8Path) -> io::Result<()> {
    let (dir, name) = open_dir_and_file(path)?;
    match dir.remove_file(name.as_str()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Whether `path` exists and is a regular file.
pub fn file_exists(path: &Utf8Path) -> bool {
    let Ok((dir, name)) = open_dir_and_file(path) else {
        return false;
    };
    dir.metadata(name.as_str()).map(|m| m.is_file()).unwrap_or(false)
}

/// Resolve an ambient directory handle for `path`'s parent plus the file
/// name within it.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Split a parent path into an ambient base directory and a relative
/// suffix, handling absolute and relative forms.
fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        Some(Component::RootDir | Component::Prefix(_)) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .expect("temp dir path should be UTF-8");
        (dir, path)
    }

    #[test]
    fn ensure_dir_creates_missing_ancestors() {
        let (_guard, base) = utf8_temp_dir();
        let nested = base.join("cache").join("import");
        ensure_dir(&nested).expect("create nested dirs");
        assert!(nested.as_std_path().is_dir());
    }

    #[test]
    fn remove_file_if_exists_tolerates_absence() {
        let (_guard, base) = utf8_temp_dir();
        let target = base.join("elements.sqlite");
        remove_file_if_exists(&target).expect("absent file is fine");
        std::fs::write(target.as_std_path(), b"x").expect("write file");
        assert!(file_exists(&target));
        remove_file_if_exists(&target).expect("remove existing file");
        assert!(!file_exists(&target));
    }
}
