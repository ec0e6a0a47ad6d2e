//! Transport seam between the engine and the network layer.

use std::future::Future;
use std::pin::Pin;

use packmule_model::FileEntry;
use thiserror::Error;

/// Errors surfaced by a transport for one upload attempt.
///
/// Every variant is retryable from the engine's point of view; the
/// distinction exists for logging and for the error message recorded
/// when the retry budget runs out.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx HTTP status. `message` already carries the server's own
    /// error text when one was readable, so it displays bare.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// The server answered 2xx but declared the upload unsuccessful.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid server response: {0}")]
    InvalidResponse(String),
}

/// Delivers whole files to the upload endpoint.
///
/// `packmule-http` implements this for real uploads; engine tests
/// script their own. Boxed futures keep the trait object-safe so the
/// schedulers can share an `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Uploads one file under its canonical target path.
    ///
    /// Resolves when the server acknowledged or definitively rejected
    /// the file; the engine imposes no time bound on the wait.
    fn upload<'a>(
        &'a self,
        file: &'a FileEntry,
        target_path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;
}
