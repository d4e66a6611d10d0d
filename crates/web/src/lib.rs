//! rivet-web: an event-driven HTTP/1.1 application server.
//!
//! One reactor thread owns all sockets and the readiness multiplexer; a
//! fixed pool of worker threads runs user handlers matched through a
//! path-segment trie. Responses, including streamed files, drain back
//! over non-blocking sockets with keep-alive support.
//!
//! ```no_run
//! use rivet_web::Server;
//!
//! let server = Server::builder()
//!     .host("127.0.0.1")
//!     .port(8080)
//!     .get("/user/:id", |req, res| {
//!         res.json(&serde_json::json!({ "id": req.param("id") }));
//!     })
//!     .build()
//!     .expect("bind failed");
//!
//! server.run().expect("server failed");
//! ```

mod config;
mod date;
mod error;
mod handler;
mod pool;
mod reactor;
mod router;
mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use handler::Handler;
pub use router::{RouteMatch, Router};
pub use server::{Server, ServerBuilder, ServerHandle};

pub use rivet_http::protocol::{Request, Response, ResponseBody};
