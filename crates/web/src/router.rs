//! Path-segment trie router.
//!
//! Routes are inserted by splitting the path on `/`; a segment starting
//! with `:` is parametric and captures exactly one non-empty request
//! segment. At every level literal children are tried before the parametric
//! child, with backtracking when a literal descent dead-ends. Matching a
//! path and matching a method are separate steps: once some route's path
//! matches, a missing method produces `MethodNotAllowed` rather than
//! falling through to a less specific route.
//!
//! A trailing slash is significant: `/a/b/` and `/a/b` are distinct routes
//! (the trailing form descends through an empty literal segment).
//!
//! The router is built before the server runs and is read-only afterwards,
//! so workers share it behind an `Arc` without locking.

use std::collections::HashMap;

use http::Method;
use tracing::warn;

use crate::handler::Handler;

#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    param: Option<ParamChild>,
    handlers: HashMap<Method, Handler>,
}

struct ParamChild {
    name: String,
    node: Box<Node>,
}

/// Result of matching a request against the route table.
pub enum RouteMatch {
    /// A route matched path and method; `params` holds the captured
    /// parametric segments.
    Found { handler: Handler, params: HashMap<String, String> },
    /// Some route matched the path, but not for this method.
    MethodNotAllowed,
    /// No route matched the path.
    NotFound,
}

/// Trie of registered routes.
#[derive(Default)]
pub struct Router {
    root: Node,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` on `path`.
    ///
    /// When two routes place differently-named parameters at the same
    /// position (`/user/:id` then `/user/:name/posts`), the first name wins
    /// and a warning is logged; the later route still registers under the
    /// existing name.
    pub fn add_route(&mut self, method: Method, path: &str, handler: Handler) {
        let mut node = &mut self.root;

        for segment in split_segments(path) {
            if let Some(param_name) = segment.strip_prefix(':') {
                let param = node.param.get_or_insert_with(|| ParamChild {
                    name: param_name.to_owned(),
                    node: Box::default(),
                });
                if param.name != param_name {
                    warn!(
                        existing = %param.name,
                        conflicting = %param_name,
                        path,
                        "conflicting parameter name at this position, keeping the existing one"
                    );
                }
                node = &mut param.node;
            } else {
                node = node.children.entry(segment.to_owned()).or_default();
            }
        }

        if node.handlers.insert(method.clone(), handler).is_some() {
            warn!(%method, path, "route registered twice, replacing the previous handler");
        }
    }

    /// Matches a request path and method against the trie.
    pub fn lookup(&self, method: &Method, path: &str) -> RouteMatch {
        let segments: Vec<&str> = split_segments(path).collect();
        let mut params = HashMap::new();

        match descend(&self.root, &segments, &mut params) {
            Some(node) => match node.handlers.get(method) {
                Some(handler) => RouteMatch::Found { handler: Handler::clone(handler), params },
                None => RouteMatch::MethodNotAllowed,
            },
            None => RouteMatch::NotFound,
        }
    }
}

/// Finds the first node (literal children preferred) whose subtree consumes
/// all remaining segments and holds at least one handler. Parameter bindings
/// are unwound on backtracking.
fn descend<'r>(node: &'r Node, segments: &[&str], params: &mut HashMap<String, String>) -> Option<&'r Node> {
    let Some((segment, rest)) = segments.split_first() else {
        return if node.handlers.is_empty() { None } else { Some(node) };
    };

    if let Some(child) = node.children.get(*segment) {
        if let Some(found) = descend(child, rest, params) {
            return Some(found);
        }
    }

    // a parameter captures one segment; the empty segment of a trailing
    // slash is not one
    if !segment.is_empty() {
        if let Some(param) = &node.param {
            params.insert(param.name.clone(), (*segment).to_owned());
            if let Some(found) = descend(&param.node, rest, params) {
                return Some(found);
            }
            params.remove(&param.name);
        }
    }

    None
}

/// Splits a path into trie segments: the leading slash and interior empty
/// segments are ignored, a trailing slash is kept as a final empty segment.
fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let keep_trailing = trimmed.ends_with('/');
    let count = trimmed.split('/').filter(|s| !s.is_empty()).count();

    trimmed
        .split('/')
        .filter(|s| !s.is_empty())
        .chain(std::iter::repeat("").take(usize::from(keep_trailing && count > 0)))
}
