//! Cached `Date` header value.
//!
//! Formatting an IMF-fixdate per response is wasted work; the reactor
//! refreshes the cached value once per event-loop tick (the poll timeout is
//! capped at one second, well inside the header's one-second resolution)
//! and workers read it lock-free through `arc-swap`.

use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use http::HeaderValue;
use httpdate::fmt_http_date;

pub(crate) struct DateService {
    current: ArcSwap<HeaderValue>,
}

impl DateService {
    pub(crate) fn new() -> Self {
        Self { current: ArcSwap::from_pointee(format_now()) }
    }

    /// Re-formats the cached value from the current wall clock.
    pub(crate) fn refresh(&self) {
        self.current.store(Arc::new(format_now()));
    }

    /// The current `Date` header value.
    pub(crate) fn value(&self) -> Arc<HeaderValue> {
        self.current.load_full()
    }
}

fn format_now() -> HeaderValue {
    // IMF-fixdate is plain ASCII, always a valid header value
    HeaderValue::from_str(&fmt_http_date(SystemTime::now())).unwrap()
}
