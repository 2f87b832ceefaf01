//! Nested time budgets
//!
//! A task owns one budget; every phase below it (probe, bootstrap, test run)
//! declares its own timeout, which is clamped to whatever the parent has
//! left. No phase can outlive the budget it was started under.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    /// A budget with no ceiling.
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().map(|r| r.is_zero()).unwrap_or(false)
    }

    /// The declared phase timeout, cut down to what the parent has left.
    pub fn clamp(&self, phase: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => phase.min(remaining),
            None => phase,
        }
    }

    /// A child budget for one phase.
    pub fn child(&self, phase: Duration) -> Budget {
        Budget::with_timeout(self.clamp(phase))
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::unbounded()
    }
}
