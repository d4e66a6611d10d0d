//! Per-connection state: read buffer, decoder, writer, idle clock.
//!
//! [`Connection`] ties the codec to one byte stream and keeps the state that
//! spans many request/response cycles on a keep-alive socket.
//! [`ResponseWriter`] is the variant-based writer that emits a response
//! across readiness events.

mod connection;
mod writer;

pub use connection::{Connection, FillOutcome};
pub use writer::{ResponseWriter, WriteOutcome};
