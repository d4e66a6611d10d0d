//! HTTP request representation.
//!
//! A [`Request`] is produced by the
//! [`RequestDecoder`](crate::codec::RequestDecoder) once a full message has
//! arrived, and is immutable from the handler's point of view. All fields are
//! owned: the decoder copies the header block once at completion and splits
//! the body out of the connection buffer, so a request can be handed to a
//! worker thread without borrowing the connection.

use std::collections::HashMap;

use bytes::Bytes;
use http::{header, HeaderMap, Method, Version};

use crate::protocol::query;

/// A fully parsed HTTP/1.1 request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    raw_query: Option<String>,
    version: Version,
    headers: HeaderMap,
    path_params: HashMap<String, String>,
    body: Bytes,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        raw_query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self { method, path, raw_query, version: Version::HTTP_11, headers, path_params: HashMap::new(), body }
    }

    /// The request method, one of GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, excluding the query component. Percent-encoding is
    /// preserved.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Always `HTTP/1.1`; other versions fail parsing.
    pub fn version(&self) -> Version {
        self.version
    }

    /// All request headers. Lookup through [`HeaderMap`] is case-insensitive.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header value as a string, or `None` when absent or not valid
    /// UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The raw query string (without the leading `?`), if any.
    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// A single query parameter, still percent-encoded. When a name repeats,
    /// the last occurrence wins.
    pub fn query(&self, name: &str) -> Option<&str> {
        let raw = self.raw_query.as_deref()?;
        query::pairs(raw).filter(|(key, _)| *key == name).map(|(_, value)| value).last()
    }

    /// All query parameters as a map, last duplicate wins. Values are raw.
    pub fn query_params(&self) -> HashMap<&str, &str> {
        match self.raw_query.as_deref() {
            Some(raw) => query::pairs(raw).collect(),
            None => HashMap::new(),
        }
    }

    /// A path parameter captured by the router, e.g. `id` for a route
    /// registered as `/user/:id`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// All path parameters bound by the router.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Installs the path parameters captured during route matching. Called by
    /// the router before the handler runs; handlers only see the result.
    pub fn bind_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// The request body: exactly `Content-Length` bytes, or empty.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the client asked to keep the connection open. HTTP/1.1
    /// defaults to keep-alive unless `Connection: close` was sent.
    pub fn wants_keep_alive(&self) -> bool {
        match self.headers.get(header::CONNECTION).and_then(|value| value.to_str().ok()) {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => true,
        }
    }
}
