use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while configuring or running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The configured host is not a dotted-quad / IP literal.
    #[error("invalid listen host {host:?}")]
    InvalidHost { host: String },

    /// Binding the listen socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// The worker count must be at least one.
    #[error("worker count must be >= 1")]
    NoWorkers,

    /// I/O error from the event loop.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
