//! HTTP codec: incremental request decoding and response serialization.
//!
//! - [`RequestDecoder`]: state machine turning the connection's read buffer
//!   into owned [`Request`](crate::protocol::Request) values
//! - [`ResponseEncoder`]: finalizes a handler's
//!   [`Response`](crate::protocol::Response) into an [`EncodedResponse`]
//!   (serialized head + resolved payload) for the writer

mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use request_decoder::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use response_encoder::{EncodedResponse, PayloadSource, ResponseEncoder};
