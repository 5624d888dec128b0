//! Request-scoped context
//!
//! Every lifecycle call carries a [`RequestContext`]: a trace id that ties the
//! log lines of one request together, a cancellation token, and an optional
//! deadline. Accessors call [`RequestContext::check`] before starting any I/O
//! and wrap blocking work in [`RequestContext::run`] so that a cancelled or
//! expired request stops touching the network, the database and the disk.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a request stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    /// The caller cancelled the request
    #[error("operation cancelled")]
    Cancelled,

    /// The request deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and tracing scope for one inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: String,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Create a fresh context with a random trace id and no deadline
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Create a context driven by an existing cancellation token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            token,
            deadline: None,
        }
    }

    /// Replace the trace id (e.g. with one propagated from an upstream caller)
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Bound the request by `timeout` from now.
    ///
    /// An earlier deadline that is already set is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Trace id shared by every log line of this request
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// The underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this request (and every child derived from it)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Derive a child context: same trace id and deadline, child token.
    ///
    /// Cancelling the child does not cancel the parent.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Fail if the request was already cancelled or its deadline has passed
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.token.is_cancelled() {
            return Err(Cancelled::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless the request is cancelled or expires first.
    ///
    /// The future is dropped as soon as cancellation wins, which abandons any
    /// in-flight network or database call it owns.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled::Cancelled),
            _ = deadline => Err(Cancelled::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
