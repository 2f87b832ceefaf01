//! Task lifecycle
//!
//! A task moves `pending -> running -> {completed, failed}`; a pending task
//! may also fail directly when its source is rejected. Terminal states are
//! sinks. Progress only moves forward and reaches 100 only on completion.

pub mod store;

use crate::error::TaskError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet started
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// No further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// One analysis request and where it stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_step: String,
    /// Repository URL or local path the task was submitted with
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            progress: 0,
            current_step: "Queued".to_string(),
            source: source.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), TaskError> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Pending | TaskStatus::Running, TaskStatus::Failed)
        );
        if !allowed {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        self.current_step = "Starting".to_string();
        Ok(())
    }

    /// Record progress. Values below the current progress are ignored and
    /// values above 99 are held at 99 until completion.
    pub fn advance(&mut self, progress: u8, step: impl Into<String>) -> Result<(), TaskError> {
        if self.status != TaskStatus::Running {
            return Err(TaskError::NotRunning(self.status));
        }
        self.progress = progress.clamp(self.progress, 99);
        self.current_step = step.into();
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Completed)?;
        self.progress = 100;
        self.current_step = "Completed".to_string();
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)?;
        self.error_message = Some(error.into());
        self.current_step = "Failed".to_string();
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// Receives `(percentage, step)` at each stage boundary.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: u8, step: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, progress: u8, step: &str) {
        self(progress, step)
    }
}

/// A sink that discards everything
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: u8, _step: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!(serde_json::to_string(&TaskStatus::Running).unwrap(), "\"running\"");
    }

    #[test]
    fn test_happy_path() {
        let mut task = Task::new("https://example.com/repo.git");
        task.start().unwrap();
        assert!(task.started_at.is_some());
        task.advance(20, "Analyzing repository").unwrap();
        task.complete().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_pending_may_fail_directly() {
        let mut task = Task::new("not a repo");
        task.fail("Invalid repository source").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.started_at.is_none());
        assert_eq!(task.error_message.as_deref(), Some("Invalid repository source"));
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        let mut task = Task::new("src");
        task.start().unwrap();
        task.fail("boom").unwrap();
        assert!(matches!(
            task.start(),
            Err(TaskError::InvalidTransition { from: TaskStatus::Failed, to: TaskStatus::Running })
        ));
        assert!(task.complete().is_err());
        assert!(task.fail("again").is_err());
        assert!(task.advance(50, "late").is_err());
        assert_eq!(task.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_pending_cannot_complete_or_advance() {
        let mut task = Task::new("src");
        assert!(task.complete().is_err());
        assert!(matches!(task.advance(10, "x"), Err(TaskError::NotRunning(TaskStatus::Pending))));
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |p: u8, s: &str| seen.lock().unwrap().push((p, s.to_string()));
        sink.report(10, "Cloning");
        NoopProgress.report(20, "ignored");
        assert_eq!(seen.lock().unwrap().as_slice(), &[(10, "Cloning".to_string())]);
    }

    proptest! {
        #[test]
        fn prop_progress_is_monotonic_and_below_100(steps in proptest::collection::vec(0u8..=255, 1..50)) {
            let mut task = Task::new("src");
            task.start().unwrap();
            let mut last = task.progress;
            for p in steps {
                task.advance(p, "step").unwrap();
                prop_assert!(task.progress >= last);
                prop_assert!(task.progress <= 99);
                last = task.progress;
            }
            task.complete().unwrap();
            prop_assert_eq!(task.progress, 100);
        }
    }
}
