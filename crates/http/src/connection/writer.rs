//! Stateful response writer.
//!
//! A response leaves the server across potentially many writability events:
//! the serialized header block first, then the in-memory body or the file
//! streamed chunk by chunk. Every transition tolerates a short write or
//! `WouldBlock` by keeping its offset, so the reactor can park the
//! connection and resume exactly where the socket stopped accepting bytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::codec::{EncodedResponse, PayloadSource};

/// What a write step achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The socket stopped accepting bytes; re-arm for writability.
    Blocked,
    /// The whole response has been written.
    Done,
}

enum WriterState {
    Idle,
    SendingHeaders { head: Bytes, payload: PayloadSource },
    SendingBytes { body: Bytes },
    SendingFile { file: File, remaining: u64 },
    Done,
}

/// Drives one response at a time onto a non-blocking byte sink.
pub struct ResponseWriter {
    state: WriterState,
    chunk: Vec<u8>,
}

impl ResponseWriter {
    pub fn new(file_chunk_size: usize) -> Self {
        Self { state: WriterState::Idle, chunk: vec![0; file_chunk_size.max(1)] }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, WriterState::Idle)
    }

    /// Accepts a finalized response. Only one response is in flight per
    /// connection; the previous one must have drained.
    pub fn start(&mut self, response: EncodedResponse) {
        debug_assert!(self.is_idle(), "previous response still in flight");
        self.state = WriterState::SendingHeaders { head: response.head, payload: response.payload };
    }

    /// Clears the writer for the next request/response cycle.
    pub fn reset(&mut self) {
        self.state = WriterState::Idle;
    }

    /// Pushes bytes at the sink until it blocks or the response is done.
    pub fn write_some<W: Write>(&mut self, io: &mut W) -> io::Result<WriteOutcome> {
        loop {
            match &mut self.state {
                WriterState::Idle | WriterState::Done => return Ok(WriteOutcome::Done),

                WriterState::SendingHeaders { head, payload } => {
                    match drain(io, head)? {
                        WriteOutcome::Blocked => return Ok(WriteOutcome::Blocked),
                        WriteOutcome::Done => {
                            trace!("header block drained");
                            self.state = match std::mem::replace(payload, PayloadSource::Empty) {
                                PayloadSource::Empty => WriterState::Done,
                                PayloadSource::Bytes(body) => WriterState::SendingBytes { body },
                                PayloadSource::File { file, remaining } => {
                                    WriterState::SendingFile { file, remaining }
                                }
                            };
                        }
                    }
                }

                WriterState::SendingBytes { body } => match drain(io, body)? {
                    WriteOutcome::Blocked => return Ok(WriteOutcome::Blocked),
                    WriteOutcome::Done => self.state = WriterState::Done,
                },

                WriterState::SendingFile { file, remaining } => {
                    if *remaining == 0 {
                        self.state = WriterState::Done;
                        continue;
                    }

                    let want = (self.chunk.len() as u64).min(*remaining) as usize;
                    let got = file.read(&mut self.chunk[..want])?;
                    if got == 0 {
                        // file shrank under us; the declared length is already
                        // on the wire, so the stream cannot be salvaged
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "file truncated while streaming"));
                    }

                    match io.write(&self.chunk[..got]) {
                        Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                        Ok(sent) => {
                            if sent < got {
                                // rewind to match what the socket accepted
                                file.seek(SeekFrom::Current(sent as i64 - got as i64))?;
                            }
                            *remaining -= sent as u64;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            file.seek(SeekFrom::Current(-(got as i64)))?;
                            return Ok(WriteOutcome::Blocked);
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                            file.seek(SeekFrom::Current(-(got as i64)))?;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }
}

/// Writes a buffer until it is empty or the sink blocks.
fn drain<W: Write>(io: &mut W, buf: &mut Bytes) -> io::Result<WriteOutcome> {
    while buf.has_remaining() {
        match io.write(buf.chunk()) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf.advance(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(WriteOutcome::Blocked),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(WriteOutcome::Done)
}
