//! Per-call cancellation and deadline

use gqlrun_core::Diagnostic;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation signal and optional deadline bound to one call
///
/// The default context never cancels and has no deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context that never cancels
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an existing cancellation token
    #[must_use]
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    /// Builder-style method to bound the call by a timeout from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Builder-style method to bound the call by a deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The cancellation token
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The deadline, if any
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the call must stop now, if it must
    #[must_use]
    pub fn interruption(&self) -> Option<Diagnostic> {
        if self.cancellation.is_cancelled() {
            return Some(Diagnostic::cancelled());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Diagnostic::deadline_exceeded()),
            _ => None,
        }
    }

    /// Race a future against cancellation and the deadline
    ///
    /// On interruption the future is dropped, abandoning any in-flight request.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Diagnostic> {
        if let Some(interruption) = self.interruption() {
            return Err(interruption);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Diagnostic::cancelled()),
            () = deadline => Err(Diagnostic::deadline_exceeded()),
            output = future => Ok(output),
        }
    }
}
