//! Value types shared across the upload pipeline.
//!
//! Session metadata, collected file entries, directory grouping and the
//! deterministic target path mapping. Everything here is plain data:
//! created once at collection time, never mutated during an upload.

mod directory;
mod mapping;
mod types;

pub use directory::{Directory, group_directories};
pub use mapping::map_target_path;
pub use types::{FileEntry, SessionMeta};

/// Errors produced when validating session metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),
}
