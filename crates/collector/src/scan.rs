//! Recursive directory scanning.
//!
//! Relative paths are normalized to forward slashes and carry the
//! scanned directory's name as their first segment, so the path mapper
//! sees the same shape a browser directory picker would produce.
//! Hidden entries (names starting with `.`) are skipped, files and
//! directories alike, and each level is visited in name order so
//! repeated runs produce the same manifest.

use std::path::{Path, PathBuf};

use packmule_model::{Directory, FileEntry};
use thiserror::Error;
use tracing::debug;

/// Errors raised while collecting a directory.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// Collects every uploadable file under `path` into a [`Directory`].
pub fn collect_directory(path: &Path) -> Result<Directory, CollectError> {
    let root = std::fs::canonicalize(path)?;
    if !root.is_dir() {
        return Err(CollectError::NotADirectory(root.display().to_string()));
    }
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| std::io::Error::other("directory has no name"))?;

    let mut files = Vec::new();
    walk_dir(&root, &root, &name, &mut files)?;

    debug!(directory = %name, files = files.len(), "collected directory");
    Ok(Directory::new(name, files))
}

fn walk_dir(
    root: &Path,
    current: &Path,
    dir_name: &str,
    files: &mut Vec<FileEntry>,
) -> Result<(), CollectError> {
    let mut entries: Vec<std::fs::DirEntry> =
        std::fs::read_dir(current)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, dir_name, files)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;

            // Normalize to forward slashes.
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");
            let mime = guess_mime(&name);

            files.push(FileEntry {
                name,
                relative_path: format!("{dir_name}/{rel_str}"),
                size: metadata.len(),
                mime_type: mime.to_string(),
                source: path,
            });
        }
    }

    Ok(())
}

/// Lists the non-hidden subdirectories of `base`, sorted by name.
///
/// Backs the default session layout where every directory next to the
/// invocation is a candidate for upload.
pub fn discover_directories(base: &Path) -> Result<Vec<PathBuf>, CollectError> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(base)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            !entry.file_name().to_string_lossy().starts_with('.')
                && entry.path().is_dir()
        })
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Best-effort content type from the file extension.
fn guess_mime(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}
