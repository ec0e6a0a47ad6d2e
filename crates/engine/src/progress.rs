//! Session-wide progress accounting.
//!
//! Settlements arrive concurrently from the directory tasks. All
//! counters live behind one lock and every mutation completes before
//! the following event send awaits, so no consumer or later settlement
//! can observe a partial update.

use std::collections::HashMap;

use packmule_model::Directory;
use tokio::sync::{RwLock, mpsc};

use crate::types::{DirectoryOutcome, DirectoryStatus, SessionTotals, UploadEvent};

/// Running counters for one directory.
struct DirectoryCounters {
    status: DirectoryStatus,
    total_files: usize,
    total_bytes: u64,
    completed: usize,
    failed: usize,
    uploaded_bytes: u64,
}

struct Inner {
    directories: HashMap<String, DirectoryCounters>,
    totals: SessionTotals,
}

/// Aggregates file and directory settlements into consistent counters
/// and emits a progress event after each update.
pub(crate) struct ProgressAggregator {
    inner: RwLock<Inner>,
    events_tx: mpsc::Sender<UploadEvent>,
}

impl ProgressAggregator {
    /// Seeds the counters from the session's directory queue.
    pub(crate) fn new(directories: &[Directory], events_tx: mpsc::Sender<UploadEvent>) -> Self {
        let mut seeded = HashMap::with_capacity(directories.len());
        let mut totals = SessionTotals::default();

        for dir in directories {
            totals.total_files += dir.files.len();
            totals.total_bytes += dir.total_bytes;
            seeded.insert(
                dir.name.clone(),
                DirectoryCounters {
                    status: DirectoryStatus::Pending,
                    total_files: dir.files.len(),
                    total_bytes: dir.total_bytes,
                    completed: 0,
                    failed: 0,
                    uploaded_bytes: 0,
                },
            );
        }

        Self {
            inner: RwLock::new(Inner {
                directories: seeded,
                totals,
            }),
            events_tx,
        }
    }

    /// Marks a directory active and announces it.
    pub(crate) async fn directory_started(&self, directory: &str) {
        let (files, total_bytes) = {
            let mut inner = self.inner.write().await;
            let Some(c) = inner.directories.get_mut(directory) else {
                return;
            };
            c.status = DirectoryStatus::Active;
            (c.total_files, c.total_bytes)
        };

        let _ = self
            .events_tx
            .send(UploadEvent::DirectoryStarted {
                directory: directory.to_string(),
                files,
                total_bytes,
            })
            .await;
    }

    /// Records one settled file. `error` is `None` for a success.
    ///
    /// Bytes accrue on settlement whether the file succeeded or failed
    /// terminally; abandoned files never reach this point.
    pub(crate) async fn on_file_settled(
        &self,
        directory: &str,
        path: &str,
        bytes: u64,
        error: Option<String>,
    ) {
        let progress = {
            let mut inner = self.inner.write().await;
            let Some(c) = inner.directories.get_mut(directory) else {
                return;
            };

            c.uploaded_bytes += bytes;
            if error.is_none() {
                c.completed += 1;
            } else {
                c.failed += 1;
            }
            let settled = c.completed + c.failed;
            let percent = percent_of(c.uploaded_bytes, c.total_bytes, settled == c.total_files);

            let progress = UploadEvent::DirectoryProgress {
                directory: directory.to_string(),
                settled,
                total: c.total_files,
                uploaded_bytes: c.uploaded_bytes,
                total_bytes: c.total_bytes,
                percent,
            };

            if error.is_none() {
                inner.totals.completed += 1;
            } else {
                inner.totals.failed += 1;
            }

            progress
        };

        let file_event = match error {
            None => UploadEvent::FileUploaded {
                directory: directory.to_string(),
                path: path.to_string(),
                bytes,
            },
            Some(error) => UploadEvent::FileFailed {
                directory: directory.to_string(),
                path: path.to_string(),
                error,
            },
        };

        let _ = self.events_tx.send(file_event).await;
        let _ = self.events_tx.send(progress).await;
    }

    /// Finalizes a directory after its task drained and returns the
    /// outcome.
    ///
    /// A directory whose files all settled is `Completed` or `Failed`;
    /// falling short of full settlement only happens when cancellation
    /// cut the directory off, so anything else is `Canceled`.
    pub(crate) async fn on_directory_settled(&self, directory: &str) -> DirectoryOutcome {
        let outcome = {
            let mut inner = self.inner.write().await;
            let Some(c) = inner.directories.get_mut(directory) else {
                return DirectoryOutcome::canceled(directory);
            };

            let status = if c.completed + c.failed == c.total_files {
                if c.failed > 0 {
                    DirectoryStatus::Failed
                } else {
                    DirectoryStatus::Completed
                }
            } else {
                DirectoryStatus::Canceled
            };
            c.status = status;

            DirectoryOutcome {
                name: directory.to_string(),
                status,
                completed: c.completed,
                failed: c.failed,
                uploaded_bytes: c.uploaded_bytes,
            }
        };

        self.send_settled(&outcome).await;
        outcome
    }

    /// Marks a never-launched directory canceled and announces it.
    pub(crate) async fn directory_canceled(&self, directory: &str) -> DirectoryOutcome {
        {
            let mut inner = self.inner.write().await;
            if let Some(c) = inner.directories.get_mut(directory) {
                c.status = DirectoryStatus::Canceled;
            }
        }

        let outcome = DirectoryOutcome::canceled(directory);
        self.send_settled(&outcome).await;
        outcome
    }

    /// Emits the final session event and returns the totals.
    pub(crate) async fn session_completed(&self, canceled: bool) -> SessionTotals {
        let totals = self.inner.read().await.totals;

        let _ = self
            .events_tx
            .send(UploadEvent::SessionCompleted {
                completed: totals.completed,
                failed: totals.failed,
                canceled,
            })
            .await;

        totals
    }

    async fn send_settled(&self, outcome: &DirectoryOutcome) {
        let _ = self
            .events_tx
            .send(UploadEvent::DirectorySettled {
                directory: outcome.name.clone(),
                status: outcome.status,
                completed: outcome.completed,
                failed: outcome.failed,
                uploaded_bytes: outcome.uploaded_bytes,
            })
            .await;
    }
}

/// Percentage of a directory's bytes that have settled, rounded.
///
/// A directory with no bytes reports 0 until every file settled,
/// then 100.
fn percent_of(uploaded: u64, total: u64, all_settled: bool) -> u8 {
    if total == 0 {
        return if all_settled { 100 } else { 0 };
    }
    ((uploaded as f64 / total as f64) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use packmule_model::FileEntry;

    fn entry(relative_path: &str, size: u64) -> FileEntry {
        FileEntry {
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            relative_path: relative_path.to_string(),
            size,
            mime_type: "image/jpeg".to_string(),
            source: PathBuf::from(relative_path),
        }
    }

    fn two_dirs() -> Vec<Directory> {
        vec![
            Directory::new("site1", vec![entry("site1/a.jpg", 1), entry("site1/b.jpg", 2)]),
            Directory::new("site2", vec![entry("site2/c.jpg", 3)]),
        ]
    }

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent_of(0, 3, false), 0);
        assert_eq!(percent_of(1, 3, false), 33);
        assert_eq!(percent_of(2, 3, false), 67);
        assert_eq!(percent_of(3, 3, true), 100);
        assert_eq!(percent_of(1, 200, false), 1);
    }

    #[test]
    fn percent_of_empty_directory() {
        assert_eq!(percent_of(0, 0, false), 0);
        assert_eq!(percent_of(0, 0, true), 100);
    }

    #[tokio::test]
    async fn seeds_totals_from_directories() {
        let (tx, _rx) = mpsc::channel(64);
        let agg = ProgressAggregator::new(&two_dirs(), tx);

        let totals = agg.session_completed(false).await;
        assert_eq!(totals.total_files, 3);
        assert_eq!(totals.total_bytes, 6);
        assert_eq!(totals.completed, 0);
        assert_eq!(totals.failed, 0);
    }

    #[tokio::test]
    async fn file_settlements_update_counters_and_emit() {
        let (tx, mut rx) = mpsc::channel(64);
        let agg = ProgressAggregator::new(&two_dirs(), tx);

        agg.on_file_settled("site1", "site1/a.jpg", 1, None).await;
        agg.on_file_settled("site1", "site1/b.jpg", 2, Some("denied".to_string()))
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            UploadEvent::FileUploaded {
                directory: "site1".to_string(),
                path: "site1/a.jpg".to_string(),
                bytes: 1,
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            UploadEvent::DirectoryProgress {
                directory: "site1".to_string(),
                settled: 1,
                total: 2,
                uploaded_bytes: 1,
                total_bytes: 3,
                percent: 33,
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            UploadEvent::FileFailed {
                directory: "site1".to_string(),
                path: "site1/b.jpg".to_string(),
                error: "denied".to_string(),
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            UploadEvent::DirectoryProgress {
                directory: "site1".to_string(),
                settled: 2,
                total: 2,
                uploaded_bytes: 3,
                total_bytes: 3,
                percent: 100,
            }
        );

        let totals = agg.session_completed(false).await;
        assert_eq!(totals.completed, 1);
        assert_eq!(totals.failed, 1);
    }

    #[tokio::test]
    async fn fully_settled_directory_is_completed_or_failed() {
        let (tx, _rx) = mpsc::channel(64);
        let agg = ProgressAggregator::new(&two_dirs(), tx);

        agg.on_file_settled("site1", "site1/a.jpg", 1, None).await;
        agg.on_file_settled("site1", "site1/b.jpg", 2, Some("denied".to_string()))
            .await;
        let failed = agg.on_directory_settled("site1").await;
        assert_eq!(failed.status, DirectoryStatus::Failed);
        assert_eq!(failed.completed, 1);
        assert_eq!(failed.failed, 1);
        assert_eq!(failed.uploaded_bytes, 3);

        agg.on_file_settled("site2", "site2/c.jpg", 3, None).await;
        let completed = agg.on_directory_settled("site2").await;
        assert_eq!(completed.status, DirectoryStatus::Completed);
        assert_eq!(completed.uploaded_bytes, 3);
    }

    #[tokio::test]
    async fn partially_settled_directory_is_canceled() {
        let (tx, _rx) = mpsc::channel(64);
        let agg = ProgressAggregator::new(&two_dirs(), tx);

        agg.on_file_settled("site1", "site1/a.jpg", 1, None).await;
        let outcome = agg.on_directory_settled("site1").await;

        assert_eq!(outcome.status, DirectoryStatus::Canceled);
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.uploaded_bytes, 1);
    }

    #[tokio::test]
    async fn never_launched_directory_reports_canceled() {
        let (tx, mut rx) = mpsc::channel(64);
        let agg = ProgressAggregator::new(&two_dirs(), tx);

        let outcome = agg.directory_canceled("site2").await;
        assert_eq!(outcome, DirectoryOutcome::canceled("site2"));

        assert_eq!(
            rx.recv().await.unwrap(),
            UploadEvent::DirectorySettled {
                directory: "site2".to_string(),
                status: DirectoryStatus::Canceled,
                completed: 0,
                failed: 0,
                uploaded_bytes: 0,
            }
        );
    }

    #[tokio::test]
    async fn concurrent_settlements_lose_no_updates() {
        let files: Vec<FileEntry> = (0..64)
            .map(|i| entry(&format!("site1/f{i}.jpg"), 1))
            .collect();
        let dir = Directory::new("site1", files);

        let (tx, mut rx) = mpsc::channel(256);
        let agg = Arc::new(ProgressAggregator::new(std::slice::from_ref(&dir), tx));

        // Drain concurrently so settlements never block on the channel.
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let mut handles = Vec::new();
        for file in &dir.files {
            let agg = agg.clone();
            let path = file.relative_path.clone();
            handles.push(tokio::spawn(async move {
                agg.on_file_settled("site1", &path, 1, None).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let outcome = agg.on_directory_settled("site1").await;
        assert_eq!(outcome.status, DirectoryStatus::Completed);
        assert_eq!(outcome.completed, 64);
        assert_eq!(outcome.uploaded_bytes, 64);

        let totals = agg.session_completed(false).await;
        assert_eq!(totals.completed, 64);

        // Dropping the aggregator closes the channel and ends the drain.
        drop(agg);
        let _ = drain.await;
    }
}
