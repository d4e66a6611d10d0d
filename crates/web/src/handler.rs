//! User handler surface.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rivet_http::protocol::{Request, Response};

/// A user-registered route handler.
///
/// Handlers are plain functions over a parsed request and a response under
/// construction. They may block (a database call, user I/O); that occupies
/// one worker thread, never the reactor.
pub type Handler = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Runs a handler, converting a panic into `None`.
///
/// The worker turns `None` into a synthesized 500; a handler fault never
/// takes down the worker thread or the connection.
pub(crate) fn invoke(handler: &Handler, request: &Request) -> Option<Response> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut response = Response::new();
        handler(request, &mut response);
        response
    }))
    .ok()
}
