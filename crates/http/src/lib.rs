//! HTTP transport for the upload engine.
//!
//! Implements [`packmule_engine::Transport`] against the collection
//! server's `/api/upload` endpoint: each file is POSTed as a multipart
//! form with a streamed `file` part and a `filepath` text field naming
//! the server-side target path.

mod client;

pub use client::HttpTransport;
