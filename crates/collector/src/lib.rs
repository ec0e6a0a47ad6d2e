//! Filesystem collection for upload sessions.
//!
//! Walks source directories and produces the upload manifest the engine
//! schedules from: one [`packmule_model::FileEntry`] per regular file,
//! with relative paths prefixed by the directory's own name.

mod scan;

pub use scan::{CollectError, collect_directory, discover_directories};
