//! Grouping collected files into upload directories.

use serde::{Deserialize, Serialize};

use crate::FileEntry;

/// A group of files sharing one top-level directory, scheduled as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub name: String,
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
}

impl Directory {
    /// Builds a directory from its files, summing their sizes.
    pub fn new(name: impl Into<String>, files: Vec<FileEntry>) -> Self {
        let total_bytes = files.iter().map(|f| f.size).sum();
        Self {
            name: name.into(),
            files,
            total_bytes,
        }
    }
}

/// Groups files by their first path segment into upload directories.
///
/// A file whose `relative_path` has no `/` forms its own single-file
/// group named after the file, mirroring how [`crate::map_target_path`]
/// treats it. File order within a group follows the input order.
///
/// `seen_order` fixes the schedule order for the names it lists
/// (duplicates collapse to the first occurrence, names without files are
/// ignored); groups it does not mention follow in discovery order.
pub fn group_directories(files: Vec<FileEntry>, seen_order: &[String]) -> Vec<Directory> {
    let mut groups: Vec<(String, Vec<FileEntry>)> = Vec::new();

    for file in files {
        let top = file
            .relative_path
            .split_once('/')
            .map(|(top, _)| top)
            .unwrap_or(file.relative_path.as_str())
            .to_string();

        match groups.iter_mut().find(|(name, _)| *name == top) {
            Some((_, bucket)) => bucket.push(file),
            None => groups.push((top, vec![file])),
        }
    }

    let mut ordered = Vec::with_capacity(groups.len());
    for name in seen_order {
        if let Some(pos) = groups.iter().position(|(n, _)| n == name) {
            let (name, bucket) = groups.remove(pos);
            ordered.push(Directory::new(name, bucket));
        }
    }
    for (name, bucket) in groups {
        ordered.push(Directory::new(name, bucket));
    }

    ordered
}
