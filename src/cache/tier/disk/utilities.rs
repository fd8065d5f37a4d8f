//! File-system helpers for the disk tier
//!
//! Missing paths are never an error here: a file that vanished between listing
//! and use simply counts as zero bytes or as already deleted.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::cache::types::timestamp_millis;

/// Recursive size in bytes of a file or directory; 0 if absent
///
/// Symlinks count with their own length and are never followed.
pub fn calculate_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Files contained in `path`
///
/// A plain file yields itself. With `recursively` only leaf files are returned,
/// otherwise the direct children (files and directories alike).
pub fn list_files(path: &Path, recursively: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(path).follow_links(false);
    if recursively {
        return walker
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| !entry.file_type().is_dir())
            .map(DirEntry::into_path)
            .collect();
    }

    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => walker
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .map(DirEntry::into_path)
            .collect(),
        Ok(_) => vec![path.to_path_buf()],
        Err(_) => Vec::new(),
    }
}

/// Name for a new node: `<8-hex-millis>-<prefix><uuid><suffix>`
pub fn unique_name(prefix: &str, suffix: &str) -> String {
    format!(
        "{:08X}-{}{}{}",
        timestamp_millis(),
        prefix,
        uuid::Uuid::new_v4().simple(),
        suffix
    )
}

/// Create a uniquely named file or directory inside `parent`
///
/// Names come from [`unique_name`]; the parent is created first and the new node
/// is created exclusively.
pub fn create_temp_file(
    directory: bool,
    prefix: &str,
    suffix: &str,
    parent: &Path,
) -> io::Result<PathBuf> {
    fs::create_dir_all(parent)?;

    let path = parent.join(unique_name(prefix, suffix));

    if directory {
        fs::create_dir(&path)?;
    } else {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
    }
    Ok(path)
}

/// Delete a file or a whole directory tree; symlinks are removed, never followed
pub fn delete_recursively(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Delete everything inside `directory`, keeping the directory itself
///
/// Every child is attempted; the first failure is returned afterwards.
pub fn delete_content(directory: &Path) -> io::Result<()> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let mut first_error = None;
    for entry in entries {
        let result = entry.and_then(|entry| delete_recursively(&entry.path()));
        if let Err(e) = result {
            log::debug!("cannot delete cache content in {:?}: {}", directory, e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Delete a file the caller no longer needs, logging instead of failing
pub fn delete_quietly(path: &Path) {
    if let Err(e) = delete_recursively(path) {
        log::debug!("cannot delete {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_size_and_listing_are_recursive() {
        let dir = TempDir::new().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(dir.path().join("a").join("one"), [0u8; 10]).expect("write");
        fs::write(nested.join("two"), [0u8; 5]).expect("write");

        assert_eq!(calculate_size(dir.path()), 15);
        assert_eq!(list_files(dir.path(), true).len(), 2);
        assert_eq!(list_files(&dir.path().join("a"), false).len(), 2);
        assert_eq!(calculate_size(&dir.path().join("missing")), 0);
        assert!(list_files(&dir.path().join("missing"), true).is_empty());
    }

    #[test]
    fn test_plain_file_lists_itself() {
        let dir = TempDir::new().expect("temp dir");
        let file = dir.path().join("single");
        fs::write(&file, [0u8; 7]).expect("write");

        assert_eq!(calculate_size(&file), 7);
        assert_eq!(list_files(&file, true), vec![file.clone()]);
        assert_eq!(list_files(&file, false), vec![file]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let dir = TempDir::new().expect("temp dir");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).expect("mkdir");
        fs::write(outside.join("big"), [0u8; 100]).expect("write");

        let cache = dir.path().join("cache");
        fs::create_dir_all(&cache).expect("mkdir");
        fs::write(cache.join("own"), [0u8; 3]).expect("write");
        std::os::unix::fs::symlink(&outside, cache.join("link")).expect("symlink");

        let files = list_files(&cache, true);
        assert_eq!(files.len(), 2);
        assert!(files.contains(&cache.join("link")));
        assert!(!files.iter().any(|file| file.ends_with("big")));
        assert!(calculate_size(&cache) < 100);
    }

    #[test]
    fn test_temp_names_are_unique_and_decorated() {
        let dir = TempDir::new().expect("temp dir");
        let first = create_temp_file(false, "entry-", "-temp", dir.path()).expect("create");
        let second = create_temp_file(false, "entry-", "-temp", dir.path()).expect("create");
        assert_ne!(first, second);

        let name = first.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.contains("-entry-"));
        assert!(name.ends_with("-temp"));

        let directory = create_temp_file(true, "", "", &dir.path().join("fresh")).expect("mkdir");
        assert!(directory.is_dir());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("leaf")).expect("mkdir");
        fs::write(tree.join("leaf").join("file"), b"x").expect("write");

        delete_recursively(&tree).expect("delete");
        assert!(!tree.exists());
        delete_recursively(&tree).expect("delete again");
    }

    #[test]
    fn test_delete_content_keeps_directory() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("a"), b"x").expect("write");
        fs::create_dir(dir.path().join("b")).expect("mkdir");

        delete_content(dir.path()).expect("delete content");
        assert!(dir.path().is_dir());
        assert_eq!(fs::read_dir(dir.path()).expect("read").count(), 0);
    }
}
