//! Public value types for the upload engine.

use std::time::Duration;

/// Concurrency and retry limits for an upload session.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Directories uploading at once.
    pub max_concurrent_directories: usize,
    /// Files in flight within one directory.
    pub max_concurrent_files: usize,
    /// Retries granted to a file after a failed attempt.
    pub max_retries: u32,
    /// Fixed wait before each retry.
    pub retry_delay: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_concurrent_directories: 3,
            max_concurrent_files: 2,
            max_retries: 5,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

/// Lifecycle of one directory within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryStatus {
    /// Queued, not yet launched.
    Pending,
    /// Files are uploading.
    Active,
    /// Every file settled, none failed.
    Completed,
    /// Every file settled, at least one failed.
    Failed,
    /// The session was canceled before every file settled.
    Canceled,
}

/// Final accounting for one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryOutcome {
    pub name: String,
    pub status: DirectoryStatus,
    pub completed: usize,
    pub failed: usize,
    /// Bytes of all settled files, successes and failures alike.
    /// Abandoned files contribute nothing.
    pub uploaded_bytes: u64,
}

impl DirectoryOutcome {
    /// Outcome for a directory the session never launched.
    pub(crate) fn canceled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: DirectoryStatus::Canceled,
            completed: 0,
            failed: 0,
            uploaded_bytes: 0,
        }
    }
}

/// Session-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub total_files: usize,
    pub total_bytes: u64,
    pub completed: usize,
    pub failed: usize,
}

/// Result of a whole upload session.
///
/// `directories` follows the plan's queue order regardless of the order
/// in which directories actually finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub directories: Vec<DirectoryOutcome>,
    pub totals: SessionTotals,
    pub canceled: bool,
}

/// Progress event emitted while a session runs.
///
/// Events carry counter snapshots; delivery order is not guaranteed,
/// so consumers key off the `directory` name and treat the latest
/// snapshot per directory as current.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A directory moved from the queue into active upload.
    DirectoryStarted {
        directory: String,
        files: usize,
        total_bytes: u64,
    },
    /// An attempt failed and the file will be retried after the delay.
    /// `attempt` is the attempt number that just failed.
    FileRetrying {
        directory: String,
        path: String,
        attempt: u32,
        error: String,
    },
    /// A file settled successfully.
    FileUploaded {
        directory: String,
        path: String,
        bytes: u64,
    },
    /// A file exhausted its retry budget.
    FileFailed {
        directory: String,
        path: String,
        error: String,
    },
    /// Updated per-directory counters after a file settled.
    DirectoryProgress {
        directory: String,
        settled: usize,
        total: usize,
        uploaded_bytes: u64,
        total_bytes: u64,
        percent: u8,
    },
    /// A directory reached a terminal status.
    DirectorySettled {
        directory: String,
        status: DirectoryStatus,
        completed: usize,
        failed: usize,
        uploaded_bytes: u64,
    },
    /// The session drained its queue (or was canceled out of it).
    SessionCompleted {
        completed: usize,
        failed: usize,
        canceled: bool,
    },
}
