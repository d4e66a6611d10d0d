//! The event loop.
//!
//! One reactor thread owns the listener, every client socket and the mio
//! poll. Workers never touch a socket: a dispatched request carries only
//! the connection's token, and the finished response comes back through a
//! channel plus a waker. While a worker owns a request, its connection is
//! deregistered from the poll, so at most one pipeline (read, handle or
//! write) operates on a connection at any moment. This simulates one-shot
//! readiness registration, which mio does not provide directly.
//!
//! Connection life cycle per request:
//! readable → fill buffer → decode → deregister + dispatch to pool →
//! worker posts response + wake → register writable → drain writer →
//! reset (keep-alive) or close.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, trace, warn};

use rivet_http::codec::{EncodedResponse, PayloadSource, ResponseEncoder};
use rivet_http::connection::{Connection, FillOutcome, WriteOutcome};
use rivet_http::protocol::{Request, Response};

use crate::config::ServerConfig;
use crate::date::DateService;
use crate::handler;
use crate::pool::WorkerPool;
use crate::router::{RouteMatch, Router};

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// Poll timeout; housekeeping (idle sweep, date refresh) must run even on a
/// silent server.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Armed for readability, collecting the next request.
    Reading,
    /// A worker owns the request; the socket is deregistered.
    Dispatched,
    /// Armed for writability, draining the response.
    Writing,
}

struct Conn {
    inner: Connection<TcpStream>,
    stage: Stage,
    registered: bool,
}

pub(crate) struct Reactor {
    poll: Poll,
    listener: TcpListener,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
    router: Arc<Router>,
    encoder: Arc<ResponseEncoder>,
    date: Arc<DateService>,
    pool: WorkerPool,
    completed_tx: Sender<(Token, EncodedResponse)>,
    completed_rx: Receiver<(Token, EncodedResponse)>,
    connections: HashMap<Token, Conn>,
    next_token: usize,
    config: ServerConfig,
}

impl Reactor {
    pub(crate) fn new(
        poll: Poll,
        listener: TcpListener,
        running: Arc<AtomicBool>,
        waker: Arc<Waker>,
        router: Arc<Router>,
        config: ServerConfig,
    ) -> Self {
        let (completed_tx, completed_rx) = std::sync::mpsc::channel();
        Self {
            poll,
            listener,
            running,
            waker,
            router,
            encoder: Arc::new(ResponseEncoder::new(&config.server_name)),
            date: Arc::new(DateService::new()),
            pool: WorkerPool::new(config.workers, config.queue_capacity),
            completed_tx,
            completed_rx,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            config,
        }
    }

    /// Blocks in the event loop until `running` is cleared, then tears
    /// everything down: listener closed, workers joined, connections
    /// dropped.
    pub(crate) fn run(mut self) -> io::Result<()> {
        self.poll.registry().register(&mut self.listener, LISTENER, Interest::READABLE)?;
        let mut events = Events::with_capacity(1024);
        let mut last_sweep = Instant::now();

        while self.running.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            self.date.refresh();

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_ready(),
                    WAKER => {}
                    token => self.client_event(token, event),
                }
            }

            self.drain_completed();

            if last_sweep.elapsed() >= SWEEP_INTERVAL {
                self.sweep_idle();
                last_sweep = Instant::now();
            }
        }

        info!("event loop stopped, tearing down");
        let _ = self.poll.registry().deregister(&mut self.listener);
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close(token);
        }
        drop(self.listener);
        self.pool.shutdown();
        Ok(())
    }

    /// Accepts until the listener would block.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    let mut conn =
                        Connection::new(stream, self.config.read_buffer_size, self.config.file_chunk_size);
                    if let Err(e) = self.poll.registry().register(conn.stream_mut(), token, Interest::READABLE) {
                        warn!(cause = %e, "failed to register accepted socket");
                        continue;
                    }
                    trace!(%peer, token = token.0, "accepted connection");
                    self.connections.insert(token, Conn { inner: conn, stage: Stage::Reading, registered: true });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(cause = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn client_event(&mut self, token: Token, event: &Event) {
        let Some(conn) = self.connections.get(&token) else {
            return;
        };
        if event.is_error() {
            debug!(token = token.0, "socket error event");
            self.close(token);
            return;
        }

        match conn.stage {
            Stage::Reading if event.is_readable() || event.is_read_closed() => self.read_ready(token),
            Stage::Writing if event.is_writable() => self.write_ready(token),
            // stale readiness for a stage that no longer cares
            _ => {}
        }
    }

    fn read_ready(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        match conn.inner.fill() {
            Ok(FillOutcome::WouldBlock { .. }) => self.advance_read(token),
            Ok(FillOutcome::Eof { .. }) => {
                trace!(token = token.0, "peer closed connection");
                self.close(token);
            }
            Err(e) => {
                debug!(token = token.0, cause = %e, "read failed");
                self.close(token);
            }
        }
    }

    /// Runs the decoder over buffered input and advances the connection:
    /// dispatch on a complete request, re-arm for readability on a partial
    /// one, answer 400 on a malformed one.
    fn advance_read(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        match conn.inner.poll_request() {
            Ok(Some(request)) => self.dispatch(token, request),
            Ok(None) => self.arm(token, Interest::READABLE),
            Err(e) => {
                warn!(token = token.0, cause = %e, "rejecting malformed request");
                let encoded = synthesize(
                    &self.encoder,
                    &self.date.value(),
                    StatusCode::BAD_REQUEST,
                    "bad request",
                    false,
                );
                if let Some(conn) = self.connections.get_mut(&token) {
                    conn.inner.mark_close_after_write();
                    conn.inner.start_response(encoded);
                    conn.stage = Stage::Writing;
                }
                self.arm(token, Interest::WRITABLE);
            }
        }
    }

    /// Hands a parsed request to the worker pool. The socket leaves the
    /// poll until the response comes back.
    fn dispatch(&mut self, token: Token, request: Request) {
        {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            conn.stage = Stage::Dispatched;
            if conn.registered {
                if let Err(e) = self.poll.registry().deregister(conn.inner.stream_mut()) {
                    warn!(token = token.0, cause = %e, "failed to deregister socket");
                }
                conn.registered = false;
            }
        }

        let keep_alive = request.wants_keep_alive();
        let router = Arc::clone(&self.router);
        let encoder = Arc::clone(&self.encoder);
        let date = Arc::clone(&self.date);
        let tx = self.completed_tx.clone();
        let waker = Arc::clone(&self.waker);

        let submitted = self.pool.submit(Box::new(move || {
            let date_value = date.value();
            let encoded = handle_request(&router, &encoder, &date_value, request);
            if tx.send((token, encoded)).is_ok() {
                let _ = waker.wake();
            }
        }));

        if submitted.is_err() {
            warn!(token = token.0, "task queue full, answering 503");
            let encoded = synthesize(
                &self.encoder,
                &self.date.value(),
                StatusCode::SERVICE_UNAVAILABLE,
                "server overloaded",
                keep_alive,
            );
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.inner.start_response(encoded);
                conn.stage = Stage::Writing;
            }
            self.arm(token, Interest::WRITABLE);
        }
    }

    /// Installs responses posted by workers and arms their sockets for
    /// writability.
    fn drain_completed(&mut self) {
        while let Ok((token, encoded)) = self.completed_rx.try_recv() {
            match self.connections.get_mut(&token) {
                Some(conn) => {
                    conn.inner.start_response(encoded);
                    conn.stage = Stage::Writing;
                }
                None => {
                    trace!(token = token.0, "dropping response for a closed connection");
                    continue;
                }
            }
            self.arm(token, Interest::WRITABLE);
        }
    }

    fn write_ready(&mut self, token: Token) {
        let outcome = {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            conn.inner.flush_response()
        };

        match outcome {
            // still armed for writability; the next event resumes the writer
            Ok(WriteOutcome::Blocked) => {}
            Ok(WriteOutcome::Done) => self.response_done(token),
            Err(e) => {
                debug!(token = token.0, cause = %e, "write failed");
                self.close(token);
            }
        }
    }

    /// A response has fully drained: reset for keep-alive or close. A
    /// pipelined request already sitting in the buffer is picked up
    /// immediately instead of waiting for another readiness event.
    fn response_done(&mut self, token: Token) {
        let survives = {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            conn.inner.finish_response()
        };

        if !survives {
            trace!(token = token.0, "closing after response");
            self.close(token);
            return;
        }

        if let Some(conn) = self.connections.get_mut(&token) {
            conn.stage = Stage::Reading;
        }
        self.advance_read(token);
    }

    /// (Re)registers a connection for the given interest.
    fn arm(&mut self, token: Token, interest: Interest) {
        let mut failed = false;
        if let Some(conn) = self.connections.get_mut(&token) {
            let registry = self.poll.registry();
            let result = if conn.registered {
                registry.reregister(conn.inner.stream_mut(), token, interest)
            } else {
                registry.register(conn.inner.stream_mut(), token, interest)
            };
            match result {
                Ok(()) => conn.registered = true,
                Err(e) => {
                    warn!(token = token.0, cause = %e, "failed to arm socket");
                    failed = true;
                }
            }
        }
        if failed {
            self.close(token);
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if conn.registered {
                let _ = self.poll.registry().deregister(conn.inner.stream_mut());
            }
            trace!(token = token.0, "connection closed");
        }
    }

    /// Evicts connections with no read or write activity past the idle
    /// timeout.
    fn sweep_idle(&mut self) {
        let timeout = self.config.idle_timeout;
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.inner.idle_for() > timeout)
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            debug!(token = token.0, "closing idle connection");
            self.close(token);
        }
    }
}

/// Worker-side request handling: route, invoke, finalize.
fn handle_request(
    router: &Router,
    encoder: &ResponseEncoder,
    date: &HeaderValue,
    mut request: Request,
) -> EncodedResponse {
    let keep_alive = request.wants_keep_alive();

    let response = match router.lookup(request.method(), request.path()) {
        RouteMatch::Found { handler, params } => {
            request.bind_path_params(params);
            match handler::invoke(&handler, &request) {
                Some(response) => response,
                None => {
                    error!(method = %request.method(), path = request.path(), "handler panicked");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "handler fault")
                }
            }
        }
        RouteMatch::MethodNotAllowed => {
            debug!(method = %request.method(), path = request.path(), "method not allowed");
            error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        RouteMatch::NotFound => {
            debug!(method = %request.method(), path = request.path(), "no route matched");
            error_response(StatusCode::NOT_FOUND, "not found")
        }
    };

    match encoder.encode(response, date, keep_alive) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(cause = %e, "response finalization failed");
            synthesize(encoder, date, StatusCode::INTERNAL_SERVER_ERROR, "internal error", keep_alive)
        }
    }
}

/// A minimal JSON error body, the only user-visible bytes the core itself
/// produces.
fn error_response(status: StatusCode, kind: &str) -> Response {
    let mut response = Response::new();
    response.status(status).json(&serde_json::json!({ "error": kind }));
    response
}

/// Builds and finalizes a synthesized error response.
fn synthesize(
    encoder: &ResponseEncoder,
    date: &HeaderValue,
    status: StatusCode,
    kind: &str,
    keep_alive: bool,
) -> EncodedResponse {
    match encoder.encode(error_response(status, kind), date, keep_alive) {
        Ok(encoded) => encoded,
        Err(e) => {
            // unreachable for in-memory bodies, but never leave the
            // connection without a response
            error!(cause = %e, "failed to encode synthesized response");
            let head = format!(
                "HTTP/1.1 {} {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status.as_str(),
                status.canonical_reason().unwrap_or("Unknown"),
            );
            EncodedResponse { head: Bytes::from(head), payload: PayloadSource::Empty, keep_alive: false }
        }
    }
}
