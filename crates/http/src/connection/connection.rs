//! Per-socket connection state.
//!
//! A [`Connection`] owns everything with the lifetime of one client socket:
//! the read buffer the decoder consumes from, the decoder itself, the writer
//! state machine, and the idle-timeout clock. It is generic over the byte
//! stream so the whole request/response cycle can be exercised against
//! in-memory streams in tests.
//!
//! Exactly one of the two halves is active at a time: the read half until a
//! request completes, then the write half until its response drains. The
//! reactor enforces that by what it arms the socket for.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::codec::{EncodedResponse, RequestDecoder};
use crate::connection::writer::{ResponseWriter, WriteOutcome};
use crate::protocol::{ParseError, Request};

/// Outcome of draining the socket into the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The socket would block; `received` bytes were appended first.
    WouldBlock { received: usize },
    /// The peer closed its write half; `received` bytes were appended first.
    Eof { received: usize },
}

pub struct Connection<S> {
    stream: S,
    read_buf: BytesMut,
    scratch: Vec<u8>,
    decoder: RequestDecoder,
    writer: ResponseWriter,
    response_keep_alive: bool,
    close_after_write: bool,
    last_activity: Instant,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, read_buffer_size: usize, file_chunk_size: usize) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(read_buffer_size),
            scratch: vec![0; read_buffer_size.max(512)],
            decoder: RequestDecoder::new(),
            writer: ResponseWriter::new(file_chunk_size),
            response_keep_alive: true,
            close_after_write: false,
            last_activity: Instant::now(),
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Drains the socket into the read buffer until it would block, the peer
    /// closes, or a real error occurs.
    pub fn fill(&mut self) -> io::Result<FillOutcome> {
        let mut received = 0;
        loop {
            match self.stream.read(&mut self.scratch) {
                Ok(0) => {
                    self.touch();
                    return Ok(FillOutcome::Eof { received });
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&self.scratch[..n]);
                    received += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if received > 0 {
                        self.touch();
                    }
                    return Ok(FillOutcome::WouldBlock { received });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs the decoder over whatever is buffered.
    pub fn poll_request(&mut self) -> Result<Option<Request>, ParseError> {
        self.decoder.decode(&mut self.read_buf)
    }

    /// Whether unconsumed input is already buffered (a pipelined request).
    pub fn has_buffered_input(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Installs a finalized response as the pending write.
    pub fn start_response(&mut self, response: EncodedResponse) {
        self.response_keep_alive = response.keep_alive;
        self.writer.start(response);
    }

    /// Pushes pending response bytes at the socket.
    pub fn flush_response(&mut self) -> io::Result<WriteOutcome> {
        let outcome = self.writer.write_some(&mut self.stream);
        self.touch();
        outcome
    }

    /// Resets the per-request state once a response has fully drained.
    ///
    /// Buffered input is kept: it is the start of the next pipelined
    /// request. Returns `false` when the connection must close instead.
    pub fn finish_response(&mut self) -> bool {
        self.writer.reset();
        self.decoder.reset();
        self.touch();
        self.response_keep_alive && !self.close_after_write
    }

    /// Forces the connection to close once the pending response drains.
    /// Used for parse errors and other non-resumable stream states.
    pub fn mark_close_after_write(&mut self) {
        self.close_after_write = true;
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// How long the connection has been idle.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::codec::PayloadSource;
    use std::collections::VecDeque;

    /// In-memory stream: reads pop from `input`, writes land in `output`.
    /// An empty input reports `WouldBlock` unless `eof` is set.
    struct MockStream {
        input: VecDeque<u8>,
        output: Vec<u8>,
        eof: bool,
    }

    impl MockStream {
        fn with_input(bytes: &[u8]) -> Self {
            Self { input: bytes.iter().copied().collect(), output: Vec::new(), eof: false }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.input.is_empty() {
                if self.eof {
                    return Ok(0);
                }
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.input.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn encoded(head: &str, body: &str, keep_alive: bool) -> EncodedResponse {
        EncodedResponse {
            head: Bytes::copy_from_slice(head.as_bytes()),
            payload: if body.is_empty() {
                PayloadSource::Empty
            } else {
                PayloadSource::Bytes(Bytes::copy_from_slice(body.as_bytes()))
            },
            keep_alive,
        }
    }

    #[test]
    fn fill_then_parse_full_cycle() {
        let stream = MockStream::with_input(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut conn = Connection::new(stream, 8 * 1024, 4 * 1024);

        let outcome = conn.fill().unwrap();
        assert!(matches!(outcome, FillOutcome::WouldBlock { received: 32 }));

        let request = conn.poll_request().unwrap().unwrap();
        assert_eq!(request.path(), "/hello");
        assert!(!conn.has_buffered_input());

        conn.start_response(encoded("HTTP/1.1 200 OK\r\n\r\n", "hi", true));
        assert_eq!(conn.flush_response().unwrap(), WriteOutcome::Done);
        assert_eq!(conn.stream().output, b"HTTP/1.1 200 OK\r\n\r\nhi");

        assert!(conn.finish_response(), "keep-alive connection should survive");
    }

    #[test]
    fn eof_is_reported() {
        let mut stream = MockStream::with_input(b"");
        stream.eof = true;
        let mut conn = Connection::new(stream, 1024, 1024);

        assert!(matches!(conn.fill().unwrap(), FillOutcome::Eof { received: 0 }));
    }

    #[test]
    fn pipelined_tail_survives_finish() {
        let stream = MockStream::with_input(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n");
        let mut conn = Connection::new(stream, 1024, 1024);

        conn.fill().unwrap();
        let first = conn.poll_request().unwrap().unwrap();
        assert_eq!(first.path(), "/a");

        conn.start_response(encoded("H\r\n\r\n", "", true));
        conn.flush_response().unwrap();
        assert!(conn.finish_response());

        assert!(conn.has_buffered_input());
        let second = conn.poll_request().unwrap().unwrap();
        assert_eq!(second.path(), "/b");
    }

    #[test]
    fn close_requested_by_response() {
        let stream = MockStream::with_input(b"");
        let mut conn = Connection::new(stream, 1024, 1024);

        conn.start_response(encoded("H\r\n\r\n", "", false));
        conn.flush_response().unwrap();
        assert!(!conn.finish_response());
    }

    #[test]
    fn close_after_write_overrides_keep_alive() {
        let stream = MockStream::with_input(b"");
        let mut conn = Connection::new(stream, 1024, 1024);

        conn.mark_close_after_write();
        conn.start_response(encoded("H\r\n\r\n", "", true));
        conn.flush_response().unwrap();
        assert!(!conn.finish_response());
    }
}
