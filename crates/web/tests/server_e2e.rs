//! End-to-end tests: a real server on an ephemeral port, driven by plain
//! blocking sockets.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use rivet_web::{Server, ServerBuilder, ServerHandle};

/// A server running on its own thread, stopped and joined on drop.
struct TestServer {
    handle: ServerHandle,
    addr: SocketAddr,
    thread: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    fn start(configure: impl FnOnce(ServerBuilder) -> ServerBuilder) -> Self {
        let builder = Server::builder().host("127.0.0.1").port(0).workers(2);
        let server = configure(builder).build().expect("failed to bind test server");
        let addr = server.local_addr();
        let handle = server.handle();
        let thread = thread::spawn(move || server.run().expect("server run failed"));
        Self { handle, addr, thread: Some(thread) }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();
        Client { stream, buf: Vec::new() }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    fn body_text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("body is not utf-8")
    }
}

/// A client that keeps leftover bytes between responses, so back-to-back
/// responses on one keep-alive socket are read without mixing them up.
struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Client {
    fn send(&mut self, raw: &str) {
        self.stream.write_all(raw.as_bytes()).expect("send");
    }

    fn request(&mut self, raw: &str) -> HttpResponse {
        self.send(raw);
        self.read_response()
    }

    fn read_response(&mut self) -> HttpResponse {
        let mut tmp = [0u8; 4096];

        let header_end = loop {
            if let Some(pos) = find(&self.buf, b"\r\n\r\n") {
                break pos;
            }
            let n = self.stream.read(&mut tmp).expect("read headers");
            assert!(n > 0, "connection closed before headers were complete");
            self.buf.extend_from_slice(&tmp[..n]);
        };

        let head = String::from_utf8(self.buf[..header_end].to_vec()).expect("header block is not utf-8");
        let mut lines = head.split("\r\n");
        let status_line = lines.next().expect("missing status line");
        let mut parts = status_line.splitn(3, ' ');
        assert_eq!(parts.next(), Some("HTTP/1.1"));
        let status: u16 = parts.next().expect("missing status").parse().expect("status is not a number");
        let headers: Vec<(String, String)> = lines
            .map(|line| {
                let (name, value) = line.split_once(':').expect("malformed header line");
                (name.trim().to_owned(), value.trim().to_owned())
            })
            .collect();

        let content_length: usize = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse().expect("content-length is not a number"))
            .expect("response is missing content-length");

        let total = header_end + 4 + content_length;
        while self.buf.len() < total {
            let n = self.stream.read(&mut tmp).expect("read body");
            assert!(n > 0, "connection closed before body was complete");
            self.buf.extend_from_slice(&tmp[..n]);
        }

        let mut consumed: Vec<u8> = self.buf.drain(..total).collect();
        let body = consumed.split_off(header_end + 4);
        HttpResponse { status, headers, body }
    }

    /// Expects the server to close the socket (after any buffered bytes).
    fn expect_eof(&mut self) {
        let mut tmp = [0u8; 256];
        loop {
            match self.stream.read(&mut tmp) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) => panic!("expected eof, got error: {e}"),
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[test]
fn get_with_path_parameter() {
    let server = TestServer::start(|b| {
        b.get("/user/:id", |req, res| {
            res.json(&serde_json::json!({ "id": req.param("id") }));
        })
    });

    let response = server.connect().request("GET /user/42 HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), r#"{"id":"42"}"#);
    assert_eq!(response.header("content-length"), Some("11"));
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert!(response.header("date").is_some());
    assert!(response.header("server").is_some());
}

#[test]
fn post_echoes_its_body() {
    let server = TestServer::start(|b| {
        b.post("/echo", |req, res| {
            res.body(req.body().clone());
        })
    });

    let response = server.connect().request("POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello");

    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "hello");
    assert_eq!(response.header("content-length"), Some("5"));
}

#[test]
fn unknown_route_is_404() {
    let server = TestServer::start(|b| b);

    let response = server.connect().request("GET /nope HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(response.status, 404);
    assert_eq!(response.body_text(), r#"{"error":"not found"}"#);
}

#[test]
fn wrong_method_is_405() {
    let server = TestServer::start(|b| b.get("/thing", |_req, res| { res.text("ok"); }));

    let response = server.connect().request("POST /thing HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(response.status, 405);
    assert_eq!(response.body_text(), r#"{"error":"method not allowed"}"#);
}

#[test]
fn streams_a_file_larger_than_the_chunk_size() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    tmp.write_all(&content).unwrap();
    let path = tmp.path().to_path_buf();

    let server = TestServer::start(move |b| {
        b.file_chunk_size(4 * 1024).get("/f", move |_req, res| {
            res.file(&path, "application/octet-stream");
        })
    });

    let response = server.connect().request("GET /f HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-length"), Some("10000"));
    assert_eq!(response.body, content);
}

#[test]
fn keep_alive_serves_back_to_back_requests_in_order() {
    let server = TestServer::start(|b| {
        b.get("/hello", |_req, res| {
            res.text("hello");
        })
    });

    let mut client = server.connect();
    // both requests hit the socket before the first response is read
    client.send("GET /hello HTTP/1.1\r\nHost: x\r\n\r\nGET /hello HTTP/1.1\r\nHost: x\r\n\r\n");

    let first = client.read_response();
    let second = client.read_response();

    assert_eq!(first.status, 200);
    assert_eq!(second.status, 200);
    assert_eq!(first.header("connection"), Some("keep-alive"));
    assert_eq!(second.header("connection"), Some("keep-alive"));

    // the socket stays open for more requests
    let third = client.request("GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(third.status, 200);
}

#[test]
fn malformed_request_gets_400_then_close() {
    let server = TestServer::start(|b| b);

    let mut client = server.connect();
    let response = client.request("NOTAMETHOD / HTTP/1.1\r\nHost: x\r\n\r\n");

    assert_eq!(response.status, 400);
    assert_eq!(response.header("connection"), Some("close"));
    assert_eq!(response.body_text(), r#"{"error":"bad request"}"#);
    client.expect_eof();
}

#[test]
fn handler_panic_is_a_500_and_the_connection_survives() {
    let server = TestServer::start(|b| {
        b.get("/boom", |_req, _res| panic!("boom"))
            .get("/ok", |_req, res| {
                res.text("still here");
            })
    });

    let mut client = server.connect();
    let crash = client.request("GET /boom HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(crash.status, 500);
    assert_eq!(crash.body_text(), r#"{"error":"handler fault"}"#);

    let ok = client.request("GET /ok HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body_text(), "still here");
}

#[test]
fn unreadable_file_becomes_500() {
    let server = TestServer::start(|b| {
        b.get("/gone", |_req, res| {
            res.file("/definitely/not/here", "text/plain");
        })
    });

    let response = server.connect().request("GET /gone HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(response.status, 500);
}

#[test]
fn query_parameters_reach_the_handler() {
    let server = TestServer::start(|b| {
        b.get("/search", |req, res| {
            let q = req.query("q").unwrap_or("-").to_owned();
            let lang = req.query("lang").unwrap_or("-").to_owned();
            res.text(format!("{q}/{lang}"));
        })
    });

    let response = server.connect().request("GET /search?q=rust&lang=en HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "rust/en");
}

#[test]
fn connection_close_is_honored() {
    let server = TestServer::start(|b| b.get("/bye", |_req, res| { res.text("bye"); }));

    let mut client = server.connect();
    let response = client.request("GET /bye HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");

    assert_eq!(response.status, 200);
    assert_eq!(response.header("connection"), Some("close"));
    client.expect_eof();
}

#[test]
fn stop_closes_the_listener_and_joins_workers() {
    let server = TestServer::start(|b| b.get("/ping", |_req, res| { res.text("pong"); }));
    let addr = server.addr;

    let response = server.connect().request("GET /ping HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(response.status, 200);

    server.handle.stop();
    let mut server = server;
    server.thread.take().unwrap().join().expect("run() did not return cleanly");

    // the listener is gone; new connections are refused
    assert!(TcpStream::connect(addr).is_err());
}
