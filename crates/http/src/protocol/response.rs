//! HTTP response construction.
//!
//! Handlers receive a `&mut Response` and populate it through the chainable
//! setters. The core owns the rest: `Date`, `Server`, `Connection` and the
//! exact `Content-Length` are inserted during finalization (see
//! [`ResponseEncoder`](crate::codec::ResponseEncoder)), never by handlers.

use std::path::PathBuf;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use tracing::warn;

/// The response body variant the writer will stream.
///
/// Files are kept as a path until finalization; the writer opens the file
/// and streams it chunk by chunk instead of loading it into memory.
#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    Bytes(Bytes),
    File { path: PathBuf, content_type: String },
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// An HTTP response under construction.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: ResponseBody::Empty }
    }

    /// Sets the response status.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a header, overwriting any previous value for the same name.
    ///
    /// An invalid name or value is logged and skipped; handlers stay
    /// infallible.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Sets an in-memory body.
    pub fn body(&mut self, content: impl Into<Bytes>) -> &mut Self {
        self.body = ResponseBody::Bytes(content.into());
        self
    }

    /// Streams a file as the response body. The file is opened and sized at
    /// finalization time; a file that cannot be opened turns into a 500.
    pub fn file(&mut self, path: impl Into<PathBuf>, content_type: &str) -> &mut Self {
        self.body = ResponseBody::File { path: path.into(), content_type: content_type.to_owned() };
        self
    }

    /// Serializes `value` as the JSON body and sets `Content-Type`.
    ///
    /// A value that fails to serialize turns the response into a 500 so the
    /// failure is visible instead of silently sending an empty 200.
    pub fn json<T: Serialize>(&mut self, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(encoded) => {
                self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body = ResponseBody::Bytes(encoded.into());
            }
            Err(e) => {
                warn!(cause = %e, "response body failed to serialize");
                self.status = StatusCode::INTERNAL_SERVER_ERROR;
                self.body = ResponseBody::Empty;
            }
        }
        self
    }

    /// Sets a plain-text body and `Content-Type: text/plain`.
    pub fn text(&mut self, content: impl Into<Bytes>) -> &mut Self {
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        self.body = ResponseBody::Bytes(content.into());
        self
    }

    /// Sets an HTML body and `Content-Type: text/html`.
    pub fn html(&mut self, content: impl Into<Bytes>) -> &mut Self {
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        self.body = ResponseBody::Bytes(content.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_ref(&self) -> &ResponseBody {
        &self.body
    }

    /// Decomposes the response for finalization.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }
}
