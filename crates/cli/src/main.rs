//! Command-line bulk uploader.
//!
//! Collects the given directories, stamps them with session metadata,
//! and drives the upload engine against a collection server, streaming
//! progress to the log as it goes. Ctrl-C cancels cooperatively: files
//! already on the wire finish, nothing new starts.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use packmule_collector::{collect_directory, discover_directories};
use packmule_engine::{
    DirectoryStatus, SessionOutcome, SessionPlan, UploadEvent, UploadOrchestrator,
};
use packmule_http::HttpTransport;
use packmule_model::SessionMeta;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "packmule", about = "Bulk-uploads directories to a collection server")]
struct Cli {
    /// User name recorded in the session metadata
    #[arg(long)]
    user: String,

    /// Camera name recorded in the session metadata
    #[arg(long)]
    camera: String,

    /// Task name recorded in the session metadata
    #[arg(long)]
    task: String,

    /// Session date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    date: Option<String>,

    /// Base URL of the collection server
    #[arg(long, default_value = "http://localhost:5000")]
    endpoint: String,

    /// Directories to upload (defaults to every directory under the current one)
    dirs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            1
        }
    };
    if code != 0 {
        process::exit(code);
    }
}

async fn run(args: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let meta = SessionMeta::new(&args.user, &args.camera, &date, &args.task)?;

    let paths = if args.dirs.is_empty() {
        discover_directories(Path::new("."))?
    } else {
        args.dirs
    };

    let mut directories = Vec::new();
    for path in &paths {
        match collect_directory(path) {
            Ok(dir) => {
                info!(
                    directory = %dir.name,
                    files = dir.files.len(),
                    size = %format_size(dir.total_bytes),
                    "collected"
                );
                directories.push(dir);
            }
            Err(err) => warn!("skipping {}: {err}", path.display()),
        }
    }
    if directories.is_empty() {
        return Err("no directories to upload".into());
    }

    let plan = SessionPlan::new(meta, directories);
    let mut orchestrator = UploadOrchestrator::new();
    let Some(events) = orchestrator.take_events() else {
        return Err("event stream already taken".into());
    };
    let renderer = tokio::spawn(render_events(events));

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight uploads");
            cancel.cancel();
        }
    });

    let transport = Arc::new(HttpTransport::new(&args.endpoint));
    let outcome = orchestrator.run(plan, transport).await;

    // Dropping the orchestrator closes the event channel so the
    // renderer can drain and finish.
    drop(orchestrator);
    let _ = renderer.await;

    print_summary(&outcome);
    Ok(if outcome.totals.failed > 0 || outcome.canceled {
        1
    } else {
        0
    })
}

async fn render_events(mut events: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::DirectoryStarted {
                directory,
                files,
                total_bytes,
            } => {
                info!("[{directory}] uploading {files} files ({})", format_size(total_bytes));
            }
            UploadEvent::FileRetrying {
                directory,
                path,
                attempt,
                error,
            } => {
                warn!("[{directory}] attempt {attempt} failed for {path}: {error}");
            }
            UploadEvent::FileUploaded { directory, path, bytes } => {
                info!("[{directory}] uploaded {path} ({})", format_size(bytes));
            }
            UploadEvent::FileFailed { directory, path, error } => {
                error!("[{directory}] giving up on {path}: {error}");
            }
            UploadEvent::DirectoryProgress {
                directory,
                settled,
                total,
                uploaded_bytes,
                total_bytes,
                percent,
            } => {
                info!(
                    "[{directory}] {settled}/{total} files, {}/{} ({percent}%)",
                    format_size(uploaded_bytes),
                    format_size(total_bytes)
                );
            }
            UploadEvent::DirectorySettled {
                directory,
                status,
                completed,
                failed,
                ..
            } => {
                info!(
                    "[{directory}] {}: {completed} uploaded, {failed} failed",
                    status_label(status)
                );
            }
            UploadEvent::SessionCompleted { completed, failed, canceled } => {
                debug!(completed, failed, canceled, "session finished");
            }
        }
    }
}

fn print_summary(outcome: &SessionOutcome) {
    info!("upload summary:");
    for dir in &outcome.directories {
        info!(
            "  {}: {} ({} uploaded, {} failed, {})",
            dir.name,
            status_label(dir.status),
            dir.completed,
            dir.failed,
            format_size(dir.uploaded_bytes),
        );
    }
    let totals = outcome.totals;
    info!(
        "{}/{} files uploaded ({} failed)",
        totals.completed, totals.total_files, totals.failed
    );
    if outcome.canceled {
        warn!("session canceled before completion");
    }
}

fn status_label(status: DirectoryStatus) -> &'static str {
    match status {
        DirectoryStatus::Pending => "pending",
        DirectoryStatus::Active => "active",
        DirectoryStatus::Completed => "completed",
        DirectoryStatus::Failed => "failed",
        DirectoryStatus::Canceled => "canceled",
    }
}

/// Human-readable byte count (e.g. `3.50 MB`).
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_breakpoints() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3.00 TB");
    }

    #[test]
    fn status_labels_are_lowercase_words() {
        assert_eq!(status_label(DirectoryStatus::Completed), "completed");
        assert_eq!(status_label(DirectoryStatus::Canceled), "canceled");
    }
}
