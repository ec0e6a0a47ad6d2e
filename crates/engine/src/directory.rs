//! Directory-level scheduling.
//!
//! Runs every file of one directory through the upload state machine
//! with a bounded number in flight, launched in original file order.
//! Failures stay contained to their file; even a panicking upload task
//! is settled as a failed file so the directory still terminates.

use std::sync::Arc;

use packmule_model::{Directory, SessionMeta};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::progress::ProgressAggregator;
use crate::transport::Transport;
use crate::types::{DirectoryOutcome, Limits, UploadEvent};
use crate::uploader::{FileResult, UploadContext, upload_with_retry};

/// One directory's upload run, spawned per directory by the session
/// scheduler.
pub(crate) struct DirectoryRun {
    pub(crate) directory: Directory,
    pub(crate) meta: Arc<SessionMeta>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) aggregator: Arc<ProgressAggregator>,
    pub(crate) cancel: CancellationToken,
    pub(crate) limits: Limits,
    pub(crate) events_tx: mpsc::Sender<UploadEvent>,
}

impl DirectoryRun {
    /// Uploads all files, at most `limits.max_concurrent_files` in
    /// flight.
    ///
    /// Returns once every launched file settled. Files still pending
    /// when the session is canceled are abandoned without settling;
    /// in-flight ones finish on their own.
    pub(crate) async fn run(self) -> DirectoryOutcome {
        let name = self.directory.name.clone();
        info!(
            directory = %name,
            files = self.directory.files.len(),
            total_bytes = self.directory.total_bytes,
            "directory upload started"
        );
        self.aggregator.directory_started(&name).await;

        let ctx = UploadContext {
            transport: self.transport.clone(),
            meta: self.meta.clone(),
            directory: name.clone(),
            max_retries: self.limits.max_retries,
            retry_delay: self.limits.retry_delay,
            cancel: self.cancel.clone(),
            events_tx: self.events_tx.clone(),
        };

        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrent_files));
        let mut tasks: Vec<(JoinHandle<()>, String, u64)> = Vec::new();

        for file in self.directory.files.iter().cloned() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit,
            };
            // The semaphore is never closed.
            let Ok(permit) = permit else { break };

            let ctx = ctx.clone();
            let aggregator = self.aggregator.clone();
            let dir_name = name.clone();
            let path = file.relative_path.clone();
            let size = file.size;
            let handle = tokio::spawn(async move {
                let result = upload_with_retry(&ctx, &file).await;
                match &result {
                    FileResult::Succeeded => {
                        aggregator
                            .on_file_settled(&dir_name, &file.relative_path, file.size, None)
                            .await;
                    }
                    FileResult::Failed(err) => {
                        aggregator
                            .on_file_settled(
                                &dir_name,
                                &file.relative_path,
                                file.size,
                                Some(err.clone()),
                            )
                            .await;
                    }
                    FileResult::Abandoned => {}
                }
                drop(permit);
            });
            tasks.push((handle, path, size));
        }

        for (handle, path, size) in tasks {
            if let Err(e) = handle.await {
                // A panicked task never reported its settlement; record
                // it as failed so the counters still add up.
                error!(directory = %name, file = %path, error = %e, "upload task panicked");
                self.aggregator
                    .on_file_settled(&name, &path, size, Some("upload task panicked".to_string()))
                    .await;
            }
        }

        let outcome = self.aggregator.on_directory_settled(&name).await;
        info!(
            directory = %name,
            status = ?outcome.status,
            completed = outcome.completed,
            failed = outcome.failed,
            uploaded_bytes = outcome.uploaded_bytes,
            "directory upload finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::types::DirectoryStatus;
    use packmule_model::FileEntry;
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn entry(relative_path: &str, size: u64) -> FileEntry {
        FileEntry {
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            relative_path: relative_path.to_string(),
            size,
            mime_type: "image/jpeg".to_string(),
            source: PathBuf::from(relative_path),
        }
    }

    fn fast_limits() -> Limits {
        Limits {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            ..Limits::default()
        }
    }

    async fn run_dir(
        directory: Directory,
        transport: Arc<dyn Transport>,
        limits: Limits,
        cancel: CancellationToken,
    ) -> DirectoryOutcome {
        let (tx, _rx) = mpsc::channel(256);
        let aggregator = Arc::new(ProgressAggregator::new(
            std::slice::from_ref(&directory),
            tx.clone(),
        ));
        let run = DirectoryRun {
            directory,
            meta: Arc::new(SessionMeta::new("alice", "cam1", "2024-01-01", "survey").unwrap()),
            transport,
            aggregator,
            cancel,
            limits,
            events_tx: tx,
        };
        run.run().await
    }

    /// Tracks how many uploads run at the same time.
    struct CountingTransport {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl CountingTransport {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                max: AtomicUsize::new(0),
            }
        }

        fn max_seen(&self) -> usize {
            self.max.load(Ordering::SeqCst)
        }
    }

    impl Transport for CountingTransport {
        fn upload<'a>(
            &'a self,
            _file: &'a FileEntry,
            _target_path: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
            Box::pin(async move {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.max.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    /// Fails uploads whose relative path matches; succeeds otherwise.
    struct FailPathTransport {
        fail_path: String,
    }

    impl Transport for FailPathTransport {
        fn upload<'a>(
            &'a self,
            file: &'a FileEntry,
            _target_path: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
            Box::pin(async move {
                if file.relative_path == self.fail_path {
                    Err(TransportError::Rejected("denied".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    /// Cancels the session token from inside the first upload.
    struct CancelingTransport {
        cancel: CancellationToken,
    }

    impl Transport for CancelingTransport {
        fn upload<'a>(
            &'a self,
            _file: &'a FileEntry,
            _target_path: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
            Box::pin(async move {
                self.cancel.cancel();
                Ok(())
            })
        }
    }

    /// Panics for one path to prove task isolation.
    struct PanickingTransport {
        panic_path: String,
    }

    impl Transport for PanickingTransport {
        fn upload<'a>(
            &'a self,
            file: &'a FileEntry,
            _target_path: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
            Box::pin(async move {
                if file.relative_path == self.panic_path {
                    panic!("transport blew up");
                }
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounds_in_flight_files() {
        let files = (0..5).map(|i| entry(&format!("site1/f{i}.jpg"), 1)).collect();
        let transport = Arc::new(CountingTransport::new());

        let outcome = run_dir(
            Directory::new("site1", files),
            transport.clone(),
            Limits::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, DirectoryStatus::Completed);
        assert_eq!(outcome.completed, 5);
        assert!(transport.max_seen() <= 2, "saw {}", transport.max_seen());
    }

    #[tokio::test]
    async fn failed_file_keeps_siblings_running() {
        let files = vec![
            entry("site1/a.jpg", 1),
            entry("site1/b.jpg", 2),
            entry("site1/c.jpg", 3),
        ];
        let transport = Arc::new(FailPathTransport {
            fail_path: "site1/b.jpg".to_string(),
        });

        let outcome = run_dir(
            Directory::new("site1", files),
            transport,
            fast_limits(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, DirectoryStatus::Failed);
        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 1);
        // Settled bytes include the failed file.
        assert_eq!(outcome.uploaded_bytes, 6);
    }

    #[tokio::test]
    async fn cancel_mid_directory_abandons_pending_files() {
        let files = vec![
            entry("site1/a.jpg", 1),
            entry("site1/b.jpg", 2),
            entry("site1/c.jpg", 3),
        ];
        let cancel = CancellationToken::new();
        let transport = Arc::new(CancelingTransport {
            cancel: cancel.clone(),
        });

        // One file at a time so the first settles before the rest launch.
        let limits = Limits {
            max_concurrent_files: 1,
            ..fast_limits()
        };
        let outcome = run_dir(Directory::new("site1", files), transport, limits, cancel).await;

        assert_eq!(outcome.status, DirectoryStatus::Canceled);
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.uploaded_bytes, 1);
    }

    #[tokio::test]
    async fn panicked_upload_settles_as_failed() {
        let files = vec![
            entry("site1/a.jpg", 1),
            entry("site1/b.jpg", 2),
            entry("site1/c.jpg", 3),
        ];
        let transport = Arc::new(PanickingTransport {
            panic_path: "site1/b.jpg".to_string(),
        });

        let outcome = run_dir(
            Directory::new("site1", files),
            transport,
            fast_limits(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.status, DirectoryStatus::Failed);
        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.uploaded_bytes, 6);
    }
}
