//! Upload orchestration engine.
//!
//! The scheduling core for bulk uploads. It owns no network code and
//! walks no filesystem: callers hand it a [`SessionPlan`] of grouped
//! directories plus a [`Transport`] and consume [`UploadEvent`]s while
//! [`UploadOrchestrator::run`] drives the session to a
//! [`SessionOutcome`].
//!
//! # Pipeline
//!
//! 1. Session scheduler: pulls directories off a FIFO queue, at most
//!    3 active
//! 2. Directory scheduler: runs one directory's files, at most 2 in
//!    flight
//! 3. File state machine: per-file attempts with fixed-delay retries
//!    (6 attempts total by default)
//! 4. Progress aggregator: consistent counters and events under
//!    concurrent settlement
//!
//! Failures are isolated to the failing file; cancellation is a single
//! cooperative token that stops new launches and lets in-flight
//! transfers settle.

mod directory;
mod progress;
mod session;
mod transport;
mod types;
mod uploader;

pub use session::{SessionPlan, UploadOrchestrator};
pub use transport::{Transport, TransportError};
pub use types::{
    DirectoryOutcome, DirectoryStatus, Limits, SessionOutcome, SessionTotals, UploadEvent,
};
