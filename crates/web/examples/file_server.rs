//! Serves files from a directory, streaming them chunk by chunk.
//!
//! Run with:
//! ```bash
//! cargo run --example file_server -- ./some/dir
//! ```
//!
//! Then:
//! ```bash
//! curl -v http://127.0.0.1:8080/static/index.html
//! ```

use std::path::PathBuf;

use http::StatusCode;
use rivet_web::Server;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let root = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_owned()));

    let server = Server::builder()
        .host("127.0.0.1")
        .port(8080)
        .get("/static/:name", move |req, res| {
            let name = req.param("name").unwrap_or_default();
            if name.contains("..") || name.contains('/') {
                res.status(StatusCode::NOT_FOUND).json(&serde_json::json!({ "error": "not found" }));
                return;
            }

            let path = root.join(name);
            if !path.is_file() {
                res.status(StatusCode::NOT_FOUND).json(&serde_json::json!({ "error": "not found" }));
                return;
            }

            res.file(&path, content_type_for(name));
        })
        .build()
        .expect("failed to bind");

    server.run().expect("server failed");
}
