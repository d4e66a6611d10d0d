//! Incremental HTTP/1.1 request decoder.
//!
//! The decoder is a two-state machine over the connection's read buffer:
//! the request line and headers are parsed together with `httparse` once the
//! header block has fully arrived, then the body state waits for exactly
//! `Content-Length` bytes. Each call consumes the prefix it recognized and
//! leaves any trailing bytes (the start of a pipelined request) in place.
//!
//! All produced [`Request`] fields are owned; the single copy happens here,
//! at completion, so the request can move to a worker thread.

use std::mem::MaybeUninit;

use bytes::{Buf, BytesMut};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use httparse::Status;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, Request};

/// Upper bound on the number of headers in a request.
pub const MAX_HEADER_NUM: usize = 64;

/// Upper bound on the size of the request line plus header block.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Everything known about a request once its header block is parsed.
struct Head {
    method: Method,
    path: String,
    raw_query: Option<String>,
    headers: HeaderMap,
}

enum DecodeState {
    /// Waiting for the complete request line + header block.
    Head,
    /// Header block consumed; waiting for `remaining` body bytes.
    Body { head: Head, remaining: u64 },
}

/// Incremental request decoder, one per connection.
pub struct RequestDecoder {
    state: DecodeState,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self { state: DecodeState::Head }
    }

    /// Forgets any partial parse, ready for the next request.
    pub fn reset(&mut self) {
        self.state = DecodeState::Head;
    }

    /// Consumes a recognized prefix of `src`.
    ///
    /// Returns `Ok(Some(request))` when a full request was decoded,
    /// `Ok(None)` when more bytes are needed, and an error for a malformed
    /// request. After an error the decoder must be [`reset`](Self::reset)
    /// before reuse; the server closes the connection instead.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, ParseError> {
        if let DecodeState::Head = self.state {
            match self.decode_head(src)? {
                Some((head, content_length)) => {
                    self.state = DecodeState::Body { head, remaining: content_length };
                }
                None => return Ok(None),
            }
        }

        // Body state: either entered above or left over from a previous call.
        let DecodeState::Body { remaining, .. } = &self.state else { unreachable!() };
        if (src.len() as u64) < *remaining {
            return Ok(None);
        }

        let DecodeState::Body { head, remaining } = std::mem::replace(&mut self.state, DecodeState::Head) else {
            unreachable!()
        };
        let body = src.split_to(remaining as usize).freeze();
        Ok(Some(Request::new(head.method, head.path, head.raw_query, head.headers, body)))
    }

    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<(Head, u64)>, ParseError> {
        let mut req = httparse::Request::new(&mut []);
        let mut header_slots: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            unsafe { MaybeUninit::uninit().assume_init() };

        let parsed = req.parse_with_uninit_headers(src, &mut header_slots).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match parsed {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };
        trace!(header_bytes = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let method = parse_method(req.method.ok_or(ParseError::InvalidMethod)?)?;

        match req.version {
            Some(1) => {}
            version => return Err(ParseError::InvalidVersion(version)),
        }

        let target = req.path.ok_or(ParseError::InvalidUri)?;
        ensure!(target.starts_with('/') || target == "*", ParseError::InvalidUri);
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };

        let mut headers = HeaderMap::with_capacity(req.headers.len());
        for header in req.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| ParseError::invalid_header(header.name))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|_| ParseError::invalid_header(header.name))?;
            // duplicate names keep the last value
            headers.insert(name, value);
        }

        let content_length = parse_content_length(&headers)?;

        src.advance(body_offset);
        Ok(Some((Head { method, path, raw_query, headers }, content_length)))
    }
}

fn parse_method(token: &str) -> Result<Method, ParseError> {
    match token {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(ParseError::InvalidMethod),
    }
}

/// Determines the expected body length, refusing transfer codings.
///
/// Refer: <https://www.rfc-editor.org/rfc/rfc7230#section-3.3>
fn parse_content_length(headers: &HeaderMap) -> Result<u64, ParseError> {
    let te_header = headers.get(header::TRANSFER_ENCODING);
    let cl_header = headers.get(header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(0),

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Err(ParseError::UnsupportedTransferEncoding("chunked".to_owned()))
            } else {
                Ok(0)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value is not a string"))?;
            cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present in headers"))
        }
    }
}

fn is_chunked(header_value: &HeaderValue) -> bool {
    header_value
        .to_str()
        .ok()
        .and_then(|encodings| encodings.rsplit(',').next())
        .map(|last_encoding| last_encoding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}
