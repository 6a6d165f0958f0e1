//! Dispatch outcome log sink — fire-and-forget observability seam.
//!
//! Sink failures never propagate into a send result; the engine swallows
//! them and notes the loss on the diagnostic tracing channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Delivered { provider_message_id: String },
    Failed { error: String },
}

/// One dispatch outcome, as handed to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub at: DateTime<Utc>,
    /// `"account:<address>"` or `"relay"`.
    pub transport: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub outcome: RecordOutcome,
}

#[derive(Debug, thiserror::Error)]
#[error("log sink failed: {0}")]
pub struct SinkError(pub String);

/// Fire-and-forget outcome recorder.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn record(&self, record: &DispatchRecord) -> Result<(), SinkError>;
}

/// Default sink: structured tracing events.
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn record(&self, record: &DispatchRecord) -> Result<(), SinkError> {
        match &record.outcome {
            RecordOutcome::Delivered {
                provider_message_id,
            } => {
                tracing::info!(
                    transport = %record.transport,
                    recipients = record.recipients.len(),
                    subject = %record.subject,
                    provider_message_id = %provider_message_id,
                    "Dispatch delivered"
                );
            }
            RecordOutcome::Failed { error } => {
                tracing::warn!(
                    transport = %record.transport,
                    recipients = record.recipients.len(),
                    subject = %record.subject,
                    error = %error,
                    "Dispatch failed"
                );
            }
        }
        Ok(())
    }
}

/// In-memory sink used by tests to assert on recorded outcomes.
#[derive(Default)]
pub struct MemorySink {
    records: std::sync::Mutex<Vec<DispatchRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn record(&self, record: &DispatchRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// A sink that always fails; exercises the swallow-and-continue path.
pub struct FailingSink;

#[async_trait]
impl LogSink for FailingSink {
    async fn record(&self, _record: &DispatchRecord) -> Result<(), SinkError> {
        Err(SinkError("sink unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DispatchRecord {
        DispatchRecord {
            at: Utc::now(),
            transport: "account:ana@agency.com".into(),
            recipients: vec!["lead@client.com".into()],
            subject: "Hi".into(),
            outcome: RecordOutcome::Delivered {
                provider_message_id: "q1".into(),
            },
        }
    }

    #[tokio::test]
    async fn memory_sink_collects_records() {
        let sink = MemorySink::new();
        sink.record(&record()).await.unwrap();
        sink.record(&record()).await.unwrap();
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        assert!(TracingSink.record(&record()).await.is_ok());
    }

    #[test]
    fn record_serializes_with_status_tag() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["outcome"]["status"], "delivered");
        assert_eq!(json["transport"], "account:ana@agency.com");
    }
}
