use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::Result;

/// Extensions of metadata spreadsheets
pub const METADATA_EXTENSIONS: &[&str] = &["xlsx"];

/// Extensions of checksum manifests
pub const MANIFEST_EXTENSIONS: &[&str] = &["md5", "txt"];

/// Serves as file filter for the directory tree walker.
///
/// Accepts regular files whose extension (case-insensitive) is in `extensions`.
/// Office lock files (`~$foo.xlsx`) are ignored.
fn file_filter(entry: &DirEntry, extensions: &[&str]) -> bool {
    if !entry.file_type().is_file() {
        return false;
    }
    if entry.file_name().to_string_lossy().starts_with("~$") {
        return false;
    }
    entry
        .path()
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
        .unwrap_or(false)
}

/// Discover all files below `root` matching one of `extensions`, in a stable
/// (sorted) order
pub fn find_files(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if file_filter(&entry, extensions) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}
