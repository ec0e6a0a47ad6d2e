//! Deterministic target path mapping.
//!
//! The server-side layout is `{user}_{camera}/{task}_{date}_{topDir}/...`:
//! the session metadata is folded into the first two path levels and the
//! rest of the file's original path is kept verbatim.

use crate::SessionMeta;

/// Computes the canonical target path for a file's original relative path.
///
/// The first path segment (or the whole path when it contains no `/`)
/// becomes `{task}_{date}_{segment}` under the session's
/// `{user}_{camera}` root:
///
/// - `site1/a.jpg` → `alice_cam1/survey_2024-01-01_site1/a.jpg`
/// - `photo.jpg` → `alice_cam1/survey_2024-01-01_photo.jpg`
///
/// Pure string assembly. No escaping or separator normalization happens
/// here; character policy is the server's responsibility. Calling this
/// again for a retry of the same file yields the identical string.
pub fn map_target_path(meta: &SessionMeta, relative_path: &str) -> String {
    let (top_dir, rest) = match relative_path.split_once('/') {
        Some((top, rest)) if !rest.is_empty() => (top, Some(rest)),
        Some((top, _)) => (top, None),
        None => (relative_path, None),
    };

    let new_top_dir = format!("{}_{}_{}", meta.task(), meta.date(), top_dir);

    match rest {
        Some(rest) => format!("{}_{}/{}/{}", meta.user(), meta.camera(), new_top_dir, rest),
        None => format!("{}_{}/{}", meta.user(), meta.camera(), new_top_dir),
    }
}
