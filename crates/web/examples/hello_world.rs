//! Minimal server with a few routes.
//!
//! Run with:
//! ```bash
//! cargo run --example hello_world
//! ```
//!
//! Then:
//! ```bash
//! curl http://127.0.0.1:8080/hello
//! curl http://127.0.0.1:8080/user/42
//! curl -d 'ping' http://127.0.0.1:8080/echo
//! ```

use rivet_web::Server;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = Server::builder()
        .host("127.0.0.1")
        .port(8080)
        .get("/hello", |_req, res| {
            res.text("hello world\n");
        })
        .get("/user/:id", |req, res| {
            res.json(&serde_json::json!({ "id": req.param("id") }));
        })
        .post("/echo", |req, res| {
            res.body(req.body().clone());
        })
        .build()
        .expect("failed to bind");

    server.run().expect("server failed");
}
