//! Server tuning knobs.
//!
//! Defaults are sized for a small service: conservative buffers, a bounded
//! task queue, and a one-minute idle timeout. Every knob has a setter on
//! [`ServerBuilder`](crate::ServerBuilder).

use std::thread;
use std::time::Duration;

/// Configuration consumed by the reactor and worker pool.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host, a dotted-quad or `0.0.0.0` (default: `0.0.0.0`).
    pub host: String,

    /// Listen port (default: `8080`).
    pub port: u16,

    /// Number of worker threads executing handlers (default: the number of
    /// hardware threads, at least 1).
    pub workers: usize,

    /// Listen backlog passed to the kernel (default: `1024`).
    pub backlog: u32,

    /// Connections with no read or write activity for this long are closed
    /// by the reactor's housekeeping pass (default: 60 s).
    pub idle_timeout: Duration,

    /// Initial per-connection read buffer size; the buffer grows as needed
    /// (default: 8 KiB).
    pub read_buffer_size: usize,

    /// Bytes read from a file body per write step (default: 4 KiB).
    pub file_chunk_size: usize,

    /// High-water mark of the worker task queue. Submissions beyond it are
    /// answered with a synthesized 503 (default: 1024).
    pub queue_capacity: usize,

    /// Value of the `Server` response header unless a handler set its own
    /// (default: `rivet`).
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            backlog: 1024,
            idle_timeout: Duration::from_secs(60),
            read_buffer_size: 8 * 1024,
            file_chunk_size: 4 * 1024,
            queue_capacity: 1024,
            server_name: "rivet".to_owned(),
        }
    }
}
