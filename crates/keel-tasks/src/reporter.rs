//! Task lifecycle reporting

use std::sync::Mutex;
use std::time::Duration;

/// Events emitted over a task's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task was accepted by the backend
    Sent { name: String, uuid: String },
    /// A worker picked the task up
    Started { name: String, uuid: String },
    /// The handler returned successfully
    Succeeded {
        name: String,
        uuid: String,
        duration: Duration,
    },
    /// The handler returned an error
    Failed {
        name: String,
        uuid: String,
        duration: Duration,
        error: String,
    },
    /// Historical state was dropped
    Purged { uuid: String },
}

/// Trait for reporting task lifecycle events
pub trait TaskReporter: Send + Sync {
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Sent { name, uuid } => {
                tracing::info!(task = %name, uuid = %uuid, "task sent");
            }
            TaskEvent::Started { name, uuid } => {
                tracing::debug!(task = %name, uuid = %uuid, "task started");
            }
            TaskEvent::Succeeded {
                name,
                uuid,
                duration,
            } => {
                tracing::info!(
                    task = %name,
                    uuid = %uuid,
                    "task succeeded in {:.1}s",
                    duration.as_secs_f64()
                );
            }
            TaskEvent::Failed {
                name,
                uuid,
                duration,
                error,
            } => {
                tracing::error!(
                    task = %name,
                    uuid = %uuid,
                    "task failed after {:.1}s: {}",
                    duration.as_secs_f64(),
                    error
                );
            }
            TaskEvent::Purged { uuid } => {
                tracing::debug!(uuid = %uuid, "task state purged");
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        reporter.report(&TaskEvent::Sent {
            name: "Create-Release-Task".to_string(),
            uuid: "u1".to_string(),
        });
        reporter.report(&TaskEvent::Purged {
            uuid: "u0".to_string(),
        });
        assert_eq!(reporter.events().len(), 2);
    }

    #[test]
    fn test_tracing_reporter() {
        // Just verify it doesn't panic
        TracingReporter.report(&TaskEvent::Failed {
            name: "Delete-Release-Task".to_string(),
            uuid: "u1".to_string(),
            duration: Duration::from_secs(1),
            error: "boom".to_string(),
        });
    }
}
