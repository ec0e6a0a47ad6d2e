//! Session-level scheduling.
//!
//! Pulls directories off a FIFO queue with a bounded number active,
//! spawns a [`DirectoryRun`] per directory, and aggregates outcomes.
//! The queue order is first-seen order, never alphabetical; cancellation
//! is a single cooperative token checked before every launch.

use std::collections::HashMap;
use std::sync::Arc;

use packmule_model::{Directory, FileEntry, SessionMeta, group_directories};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::directory::DirectoryRun;
use crate::progress::ProgressAggregator;
use crate::transport::Transport;
use crate::types::{DirectoryOutcome, Limits, SessionOutcome, UploadEvent};

/// A validated, ordered upload session waiting to run.
///
/// Directory names are unique within a plan: the constructors merge
/// same-named directories into one run.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub meta: SessionMeta,
    pub directories: Vec<Directory>,
}

impl SessionPlan {
    /// Plans a session over pre-grouped directories, queued in the given
    /// order.
    ///
    /// Progress counters are keyed by directory name, so directories
    /// sharing a name are merged into a single run at the position of
    /// the first occurrence.
    pub fn new(meta: SessionMeta, directories: Vec<Directory>) -> Self {
        let mut merged: Vec<Directory> = Vec::with_capacity(directories.len());
        for dir in directories {
            match merged.iter_mut().find(|d| d.name == dir.name) {
                Some(existing) => {
                    existing.total_bytes += dir.total_bytes;
                    existing.files.extend(dir.files);
                }
                None => merged.push(dir),
            }
        }
        Self {
            meta,
            directories: merged,
        }
    }

    /// Groups loose files by top-level directory and fixes the queue
    /// order: names listed in `seen_order` go first, the rest follow in
    /// discovery order.
    pub fn from_files(meta: SessionMeta, files: Vec<FileEntry>, seen_order: &[String]) -> Self {
        let directories = group_directories(files, seen_order);
        Self { meta, directories }
    }

    /// Number of files across all directories.
    pub fn total_files(&self) -> usize {
        self.directories.iter().map(|d| d.files.len()).sum()
    }

    /// Bytes across all directories.
    pub fn total_bytes(&self) -> u64 {
        self.directories.iter().map(|d| d.total_bytes).sum()
    }
}

/// Orchestrates one upload session.
///
/// Owns the session's cancellation token and event channel. Events must
/// be consumed while the session runs: the channel buffers 256 events
/// and the engine waits for capacity rather than dropping progress.
pub struct UploadOrchestrator {
    limits: Limits,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl Default for UploadOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadOrchestrator {
    /// Creates an orchestrator with the default limits.
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    /// Creates an orchestrator with explicit limits.
    pub fn with_limits(limits: Limits) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            limits,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the whole session and reports per-directory outcomes in
    /// queue order plus session totals.
    ///
    /// Never fails as a whole: per-file and per-directory failures are
    /// data in the outcome, and cancellation marks every directory that
    /// had not fully settled as `Canceled`.
    pub async fn run(&self, plan: SessionPlan, transport: Arc<dyn Transport>) -> SessionOutcome {
        let queue_order: Vec<String> = plan.directories.iter().map(|d| d.name.clone()).collect();
        info!(
            directories = plan.directories.len(),
            files = plan.total_files(),
            total_bytes = plan.total_bytes(),
            "upload session started"
        );

        let meta = Arc::new(plan.meta);
        let aggregator = Arc::new(ProgressAggregator::new(
            &plan.directories,
            self.events_tx.clone(),
        ));

        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrent_directories));
        let mut tasks: Vec<(JoinHandle<DirectoryOutcome>, String)> = Vec::new();
        let mut outcomes: Vec<DirectoryOutcome> = Vec::with_capacity(plan.directories.len());

        for directory in plan.directories {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    outcomes.push(aggregator.directory_canceled(&directory.name).await);
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => permit,
            };
            // The semaphore is never closed.
            let Ok(permit) = permit else { break };

            let name = directory.name.clone();
            let run = DirectoryRun {
                directory,
                meta: meta.clone(),
                transport: transport.clone(),
                aggregator: aggregator.clone(),
                cancel: self.cancel.clone(),
                limits: self.limits.clone(),
                events_tx: self.events_tx.clone(),
            };
            let handle = tokio::spawn(async move {
                let outcome = run.run().await;
                drop(permit);
                outcome
            });
            tasks.push((handle, name));
        }

        for (handle, name) in tasks {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // Settle from the aggregator's counters so a panic
                    // mid-directory still yields a consistent outcome.
                    error!(directory = %name, error = %e, "directory task panicked");
                    outcomes.push(aggregator.on_directory_settled(&name).await);
                }
            }
        }

        // Completion order is unordered; report in queue order.
        let order: HashMap<&str, usize> = queue_order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        outcomes.sort_by_key(|o| order.get(o.name.as_str()).copied().unwrap_or(usize::MAX));

        let canceled = self.cancel.is_cancelled();
        let totals = aggregator.session_completed(canceled).await;
        info!(
            completed = totals.completed,
            failed = totals.failed,
            total_files = totals.total_files,
            canceled,
            "upload session finished"
        );

        SessionOutcome {
            directories: outcomes,
            totals,
            canceled,
        }
    }
}
