//! Shared `Date` header value, refreshed off the hot path.
//!
//! Formatting an HTTP-date per response is measurable waste under load;
//! a background task refreshes a lock-free cell well under the header's
//! one-second granularity and every worker reads from it.

use arc_swap::ArcSwap;
use http::HeaderValue;
use httpdate::fmt_http_date;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const REFRESH_INTERVAL: Duration = Duration::from_millis(700);

pub struct DateService {
    current: Arc<ArcSwap<HeaderValue>>,
    task: tokio::task::JoinHandle<()>,
}

impl DateService {
    /// Starts the refresher on the current runtime.
    pub fn start() -> Self {
        let current = Arc::new(ArcSwap::from_pointee(now_value()));
        let cell = Arc::clone(&current);

        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(REFRESH_INTERVAL).await;
                cell.store(Arc::new(now_value()));
            }
        });

        DateService { current, task }
    }

    pub fn handle(&self) -> DateHandle {
        DateHandle { current: Arc::clone(&self.current) }
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cheap cross-thread handle to the current date value.
#[derive(Clone)]
pub struct DateHandle {
    current: Arc<ArcSwap<HeaderValue>>,
}

impl DateHandle {
    /// A handle without a refresher behind it: the value is computed
    /// once at creation. Fine for short-lived connections and tests.
    pub fn snapshot() -> Self {
        DateHandle { current: Arc::new(ArcSwap::from_pointee(now_value())) }
    }

    pub fn current(&self) -> HeaderValue {
        HeaderValue::clone(&self.current.load())
    }
}

fn now_value() -> HeaderValue {
    HeaderValue::try_from(fmt_http_date(SystemTime::now())).expect("formatted http date is a valid header value")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_yields_a_valid_http_date() {
        let handle = DateHandle::snapshot();
        let value = handle.current();
        let text = value.to_str().unwrap();
        assert!(text.ends_with(" GMT"));
        assert!(httpdate::parse_http_date(text).is_ok());
    }
}
