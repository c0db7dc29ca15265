//! Server state shared across requests

use crate::core_chat::CollabService;
use std::time::Duration;

/// Everything a handler needs
///
/// Cloning is cheap; the service holds its manager and notifier behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub service: CollabService,

    /// Upper bound for a single request
    ///
    /// Reads are cut off when it passes; writes that have not reached the
    /// database by then fail with a 408 and store nothing.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: CollabService) -> Self {
        Self {
            service,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
