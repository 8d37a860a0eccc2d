//! Cooperative run control: cancellation flag and wall-clock budget.
//!
//! Both are checked between bars only. A bar is never interrupted midway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::TerminationReason;

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: Option<CancelToken>,
    pub timeout: Option<Duration>,
}

impl RunControl {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: None,
            timeout: Some(timeout),
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Elapsed time if the budget is exhausted.
    pub fn timed_out(&self, started: Instant) -> Option<Duration> {
        let budget = self.timeout?;
        let elapsed = started.elapsed();
        (elapsed >= budget).then_some(elapsed)
    }

    /// Cancellation first, then the time budget. `processed` is the number of
    /// steps already finished and becomes the partial-result count.
    pub fn check(&self, started: Instant, processed: usize) -> Option<TerminationReason> {
        if self.is_cancelled() {
            return Some(TerminationReason::Cancelled {
                bars_processed: processed,
            });
        }
        self.timed_out(started).map(|elapsed| TerminationReason::Timeout {
            bars_processed: processed,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}
