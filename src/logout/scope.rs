//! The tab's "current cancellation scope" for application requests.

use std::future::Future;
use std::sync::Mutex;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Request cancelled")]
pub struct Cancelled;

/// Owns the token every in-flight request of a tab is bound to.
///
/// Cancelling replaces the token rather than reusing it, so requests
/// started afterwards are not born cancelled.
#[derive(Debug, Default)]
pub struct RequestScope {
    current: Mutex<CancellationToken>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a request starting now.
    pub fn token(&self) -> CancellationToken {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Cancel every request bound to the current token and install a fresh one.
    pub fn cancel_and_renew(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *current, CancellationToken::new());
        previous.cancel();
        current.clone()
    }

    /// Run `request` in the current scope.
    pub async fn run<F: Future>(&self, request: F) -> Result<F::Output, Cancelled> {
        let token = self.token();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Cancelled),
            output = request => Ok(output),
        }
    }
}
