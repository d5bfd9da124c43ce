//! Runboard ops: long-running, cancellable operations.
//!
//! Currently the log tail: a backlog of recent entries followed by incremental polling
//! until the caller cancels.

#![forbid(unsafe_code)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod tail;

pub use tail::{tail_logs, LogTail};

/// Cancellation handle for an in-flight operation. Dropping it cancels too.
#[derive(Debug)]
pub struct CancelHandle {
    token: Option<CancellationToken>,
}

impl CancelHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token: Some(token) }
    }

    pub fn cancel(mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().map(|t| t.is_cancelled()).unwrap_or(true)
    }

    /// Token observed by the operation's helpers (pumps, forwarders).
    pub fn token(&self) -> CancellationToken {
        self.token.clone().unwrap_or_else(|| {
            let t = CancellationToken::new();
            t.cancel();
            t
        })
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

/// Result of starting a streaming operation.
pub struct StreamHandle<T> {
    pub rx: mpsc::UnboundedReceiver<T>,
    pub cancel: CancelHandle,
}

/// Knobs for the log tail.
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Most recent entries fetched before polling starts.
    pub backlog: usize,
    pub poll_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self { backlog: 50, poll_interval: Duration::from_secs(2) }
    }
}

impl TailOptions {
    /// Defaults overridden by `RUN_LOG_BACKLOG` and `RUN_LOG_POLL_MS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let backlog = std::env::var("RUN_LOG_BACKLOG")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.backlog);
        let poll_interval = std::env::var("RUN_LOG_POLL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(d.poll_interval);
        Self { backlog, poll_interval }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_handle_cancels_on_drop() {
        let token = CancellationToken::new();
        let h = CancelHandle::new(token.clone());
        assert!(!h.is_cancelled());
        drop(h);
        assert!(token.is_cancelled());
    }

    #[test]
    fn explicit_cancel() {
        let token = CancellationToken::new();
        CancelHandle::new(token.clone()).cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn default_tail_options() {
        let o = TailOptions::default();
        assert_eq!(o.backlog, 50);
        assert_eq!(o.poll_interval, Duration::from_secs(2));
    }
}
