//! Server assembly: builder, bound listener, run/stop surface.
//!
//! Routes and configuration are supplied through [`ServerBuilder`] before
//! the server exists; once [`ServerBuilder::build`] has bound the listener
//! the route table is frozen behind an `Arc` and shared read-only with the
//! workers. [`Server::run`] blocks on the reactor; [`ServerHandle::stop`]
//! is an atomic flag flip plus a waker nudge, safe from any thread or a
//! signal handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use mio::net::TcpListener;
use mio::{Poll, Waker};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::info;

use rivet_http::protocol::{Request, Response};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::Handler;
use crate::reactor::{Reactor, WAKER};
use crate::router::Router;

/// Configures routes and knobs, then binds the listener.
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self { config: ServerConfig::default(), router: Router::new() }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    pub fn file_chunk_size(mut self, size: usize) -> Self {
        self.config.file_chunk_size = size;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Registers a handler for an arbitrary method + path.
    pub fn route(
        mut self,
        method: Method,
        path: &str,
        handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static,
    ) -> Self {
        self.router.add_route(method, path, Arc::new(handler) as Handler);
        self
    }

    pub fn get(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::DELETE, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::PATCH, path, handler)
    }

    pub fn head(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::HEAD, path, handler)
    }

    pub fn options(self, path: &str, handler: impl Fn(&Request, &mut Response) + Send + Sync + 'static) -> Self {
        self.route(Method::OPTIONS, path, handler)
    }

    /// Binds the listen socket and freezes the route table.
    pub fn build(self) -> Result<Server, ServerError> {
        if self.config.workers == 0 {
            return Err(ServerError::NoWorkers);
        }

        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::InvalidHost { host: self.config.host.clone() })?;
        let addr = SocketAddr::new(ip, self.config.port);

        let listener = bind_listener(addr, self.config.backlog).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Server {
            poll,
            listener,
            local_addr,
            waker,
            running: Arc::new(AtomicBool::new(true)),
            router: Arc::new(self.router),
            config: self.config,
        })
    }
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;
    Ok(TcpListener::from_std(socket.into()))
}

/// A bound server, ready to run.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
    router: Arc<Router>,
    config: ServerConfig,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that can stop the running server from another thread.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { running: Arc::clone(&self.running), waker: Arc::clone(&self.waker) }
    }

    /// Runs the event loop until [`ServerHandle::stop`] is called.
    ///
    /// On return the listener is closed, all worker threads have joined and
    /// every connection has been dropped.
    pub fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, workers = self.config.workers, "server starting");
        let reactor = Reactor::new(self.poll, self.listener, self.running, self.waker, self.router, self.config);
        reactor.run()?;
        Ok(())
    }
}

/// Stops a running server. Cloneable, cheap, idempotent.
#[derive(Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ServerHandle {
    /// Flips the running flag and unblocks the reactor at its next tick.
    /// Safe to call from any thread, more than once, or from a signal
    /// handler.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let _ = self.waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_host_is_rejected() {
        let result = Server::builder().host("not-an-ip").build();
        assert!(matches!(result, Err(ServerError::InvalidHost { .. })));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = Server::builder().host("127.0.0.1").port(0).workers(0).build();
        assert!(matches!(result, Err(ServerError::NoWorkers)));
    }

    #[test]
    fn binds_an_ephemeral_port() {
        let server = Server::builder().host("127.0.0.1").port(0).build().unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[test]
    fn stop_before_run_returns_promptly() {
        let server = Server::builder().host("127.0.0.1").port(0).workers(1).build().unwrap();
        let handle = server.handle();
        handle.stop();
        handle.stop();
        server.run().unwrap();
    }
}
