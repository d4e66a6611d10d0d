//! Response finalization and header-block serialization.
//!
//! After a handler returns, the core (never the handler) decides the
//! `Date`, `Server`, `Connection` and `Content-Length` headers, resolves the
//! body variant (opening and sizing a file body), and serializes the whole
//! header block into a single buffer. Transmission starts only once that
//! buffer is complete, so a response is never interleaved with its
//! predecessor on the wire.

use std::fs::File;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use tracing::debug;

use crate::protocol::{Response, ResponseBody};

const INIT_HEAD_SIZE: usize = 1024;

/// A finalized response, ready for the writer state machine.
#[derive(Debug)]
pub struct EncodedResponse {
    /// Serialized status line + headers + terminating CRLF.
    pub head: Bytes,
    /// The body bytes the writer will emit after the head.
    pub payload: PayloadSource,
    /// Whether the connection may be reused once the payload has drained.
    pub keep_alive: bool,
}

impl EncodedResponse {
    /// Total bytes this response will put on the wire.
    pub fn wire_len(&self) -> u64 {
        self.head.len() as u64 + self.payload.len()
    }
}

/// Resolved body variant. Files are already open and sized; the declared
/// `Content-Length` equals [`len`](Self::len) by construction.
#[derive(Debug)]
pub enum PayloadSource {
    Empty,
    Bytes(Bytes),
    File { file: File, remaining: u64 },
}

impl PayloadSource {
    pub fn len(&self) -> u64 {
        match self {
            PayloadSource::Empty => 0,
            PayloadSource::Bytes(bytes) => bytes.len() as u64,
            PayloadSource::File { remaining, .. } => *remaining,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serializes responses, stamping the headers the core owns.
pub struct ResponseEncoder {
    server: HeaderValue,
}

impl ResponseEncoder {
    pub fn new(server: &str) -> Self {
        let server = HeaderValue::try_from(server)
            .unwrap_or_else(|_| HeaderValue::from_static("rivet"));
        Self { server }
    }

    /// Finalizes and serializes a response.
    ///
    /// A file body that cannot be opened or sized is reported as an error;
    /// the caller replaces the response with a synthesized 500 so the
    /// declared `Content-Length` is never wrong.
    pub fn encode(&self, response: Response, date: &HeaderValue, keep_alive: bool) -> io::Result<EncodedResponse> {
        let (status, mut headers, body) = response.into_parts();

        let payload = resolve_payload(body, &mut headers)?;

        headers.insert(header::DATE, date.clone());
        if !headers.contains_key(header::SERVER) {
            headers.insert(header::SERVER, self.server.clone());
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(payload.len()));
        headers.insert(
            header::CONNECTION,
            HeaderValue::from_static(if keep_alive { "keep-alive" } else { "close" }),
        );

        let head = encode_head(status, &headers);
        Ok(EncodedResponse { head, payload, keep_alive })
    }
}

fn resolve_payload(body: ResponseBody, headers: &mut HeaderMap) -> io::Result<PayloadSource> {
    match body {
        ResponseBody::Empty => Ok(PayloadSource::Empty),
        ResponseBody::Bytes(bytes) => Ok(PayloadSource::Bytes(bytes)),
        ResponseBody::File { path, content_type } => {
            let file = File::open(&path)?;
            let metadata = file.metadata()?;
            if !metadata.is_file() {
                debug!(path = %path.display(), "response body is not a regular file");
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "response body is not a regular file"));
            }
            if !headers.contains_key(header::CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::try_from(content_type.as_str()) {
                    headers.insert(header::CONTENT_TYPE, value);
                }
            }
            Ok(PayloadSource::File { file, remaining: metadata.len() })
        }
    }
}

fn encode_head(status: StatusCode, headers: &HeaderMap) -> Bytes {
    let mut dst = BytesMut::with_capacity(INIT_HEAD_SIZE);

    dst.put_slice(b"HTTP/1.1 ");
    dst.put_slice(status.as_str().as_bytes());
    dst.put_slice(b" ");
    dst.put_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
    dst.put_slice(b"\r\n");

    for (header_name, header_value) in headers.iter() {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");

    dst.freeze()
}
