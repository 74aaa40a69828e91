//! Durable event log seam consumed by the invalidation consumer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Connection refused, reset, closed, timed out or unresolvable.
    #[error("stream transport error: {0}")]
    Transport(String),
    /// The consumer group or its stream no longer exists.
    #[error("consumer group missing: {0}")]
    NoGroup(String),
    #[error("stream command failed: {0}")]
    Command(String),
}

impl StreamError {
    pub fn is_transport(&self) -> bool {
        matches!(self, StreamError::Transport(_))
    }
}

/// Outcome of a group creation attempt. An existing group counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreation {
    Created,
    AlreadyExists,
}

/// One delivered log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Identifier of the changed record, read from the `data` field's JSON
    /// (`id`, falling back to `feed_id`). Used for logging only.
    pub fn payload_id(&self) -> Option<String> {
        let data = self.fields.get("data")?;
        let payload: Value = serde_json::from_str(data).ok()?;
        let id = payload.get("id").or_else(|| payload.get("feed_id"))?;
        match id {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

/// Competing-consumer access to an append-only stream.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Establish (or re-establish) the underlying connection.
    async fn connect(&self) -> Result<(), StreamError>;

    /// Create `group` on `stream` reading from the start of the log, creating the
    /// stream when missing.
    async fn create_group(&self, stream: &str, group: &str) -> Result<GroupCreation, StreamError>;

    /// Read at most one new entry for `consumer`, waiting up to `block`.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<StreamEntry>, StreamError>;

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), StreamError>;

    /// Drop the connection. Subsequent calls fail with a transport error until `connect`.
    async fn close(&self);
}
