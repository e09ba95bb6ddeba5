use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// High-throughput publisher for job, step and chunk lifecycle events
///
/// Publishing never blocks the execution path; when nobody is subscribed the
/// event is simply dropped.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub name: String,
    pub job_execution_id: i64,
    pub step_name: Option<String>,
    pub partition: Option<u32>,
    pub payload: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl LifecycleEvent {
    /// Build a job-level event
    pub fn for_job(name: impl Into<String>, job_execution_id: i64, payload: Value) -> Self {
        Self {
            name: name.into(),
            job_execution_id,
            step_name: None,
            partition: None,
            payload,
            published_at: chrono::Utc::now(),
        }
    }

    /// Build a step-level event, optionally scoped to one partition
    pub fn for_step(
        name: impl Into<String>,
        job_execution_id: i64,
        step_name: &str,
        partition: Option<u32>,
        payload: Value,
    ) -> Self {
        Self {
            name: name.into(),
            job_execution_id,
            step_name: Some(step_name.to_string()),
            partition,
            payload,
            published_at: chrono::Utc::now(),
        }
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a lifecycle event
    pub fn publish(&self, event: LifecycleEvent) -> Result<(), PublishError> {
        // send() only fails when there are no subscribers, which is fine
        match self.sender.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}
