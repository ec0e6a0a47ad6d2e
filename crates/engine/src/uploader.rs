//! Per-file upload state machine.
//!
//! Drives one file through attempt, retry and terminal states against
//! the transport. Retries run in a bounded loop with a fixed delay;
//! cancellation is checked before every attempt and during the delay.

use std::sync::Arc;
use std::time::Duration;

use packmule_model::{FileEntry, SessionMeta, map_target_path};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::Transport;
use crate::types::UploadEvent;

/// How a single file left the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FileResult {
    /// Server acknowledged the file.
    Succeeded,
    /// Retry budget exhausted; carries the last error message.
    Failed(String),
    /// Session canceled before an attempt could start; the file counts
    /// as neither completed nor failed.
    Abandoned,
}

/// Shared pieces every file task of one directory needs.
/// Cloned into each spawned upload task.
#[derive(Clone)]
pub(crate) struct UploadContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) meta: Arc<SessionMeta>,
    pub(crate) directory: String,
    pub(crate) max_retries: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) cancel: CancellationToken,
    pub(crate) events_tx: mpsc::Sender<UploadEvent>,
}

/// Uploads one file, retrying transient failures up to the budget.
///
/// The target path is derived once; it is a pure function of the
/// session metadata and the file's relative path, so every attempt
/// sends the identical path.
pub(crate) async fn upload_with_retry(ctx: &UploadContext, file: &FileEntry) -> FileResult {
    let target_path = map_target_path(&ctx.meta, &file.relative_path);
    let mut attempt: u32 = 1;

    loop {
        if ctx.cancel.is_cancelled() {
            debug!(file = %file.relative_path, "abandoning file, session canceled");
            return FileResult::Abandoned;
        }

        debug!(file = %file.relative_path, target = %target_path, attempt, "upload attempt");

        match ctx.transport.upload(file, &target_path).await {
            Ok(()) => {
                debug!(file = %file.relative_path, attempt, "upload succeeded");
                return FileResult::Succeeded;
            }
            Err(e) => {
                let error = e.to_string();
                if attempt > ctx.max_retries {
                    warn!(
                        file = %file.relative_path,
                        attempt,
                        error = %error,
                        "upload failed, retry budget exhausted"
                    );
                    return FileResult::Failed(error);
                }

                warn!(
                    file = %file.relative_path,
                    attempt,
                    error = %error,
                    "upload attempt failed, retrying"
                );
                let _ = ctx
                    .events_tx
                    .send(UploadEvent::FileRetrying {
                        directory: ctx.directory.clone(),
                        path: file.relative_path.clone(),
                        attempt,
                        error,
                    })
                    .await;

                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        debug!(file = %file.relative_path, "abandoning file during retry delay");
                        return FileResult::Abandoned;
                    }
                    _ = sleep(ctx.retry_delay) => {}
                }

                attempt += 1;
            }
        }
    }
}
