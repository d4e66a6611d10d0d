//! Error types for HTTP request parsing.
//!
//! [`ParseError`] covers every way an incoming byte stream can fail to become
//! a [`Request`](crate::protocol::Request). Parse errors never propagate past
//! the read pipeline: the server answers them with a synthesized 400 and
//! closes the connection once the response has drained.

use std::io;
use thiserror::Error;

/// Errors that occur while parsing an HTTP request.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Header block size exceeds the maximum allowed size
    #[error("header block too large, current: {current_size} exceeds the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    /// Number of headers exceeds the maximum allowed
    #[error("header number exceeds the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    /// Invalid header format or content
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// Request version is not HTTP/1.1
    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    /// Method token is not one of the seven supported methods
    #[error("invalid http method")]
    InvalidMethod,

    /// Invalid request target
    #[error("invalid http uri")]
    InvalidUri,

    /// Invalid Content-Length header
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// Request declares a transfer coding the server does not speak
    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// I/O error during parsing
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    /// Creates a new TooLargeHeader error
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    /// Creates a new TooManyHeaders error
    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    /// Creates a new InvalidHeader error
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    /// Creates a new InvalidContentLength error
    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }
}
