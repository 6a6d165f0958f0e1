//! Bulk sequencer — ordered sends with an inter-message delay.

use std::sync::Arc;
use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::config::DEFAULT_BULK_DELAY_MS;
use crate::dispatch::DispatchEngine;
use crate::error::DispatchError;
use crate::message::{SendRequest, SendResult};

/// Outcome of one item in a bulk run, tagged with its input index.
#[derive(Debug)]
pub struct BulkOutcome {
    pub index: usize,
    pub outcome: Result<SendResult, DispatchError>,
}

impl Serialize for BulkOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BulkOutcome", 3)?;
        state.serialize_field("index", &self.index)?;
        match &self.outcome {
            Ok(result) => {
                state.serialize_field("status", "sent")?;
                state.serialize_field("result", result)?;
            }
            Err(e) => {
                state.serialize_field("status", "failed")?;
                state.serialize_field("error", &e.to_string())?;
            }
        }
        state.end()
    }
}

/// Sends an ordered list of requests through the dispatch engine, one at
/// a time, pausing between items to avoid bursty sending patterns.
///
/// Deliberately sequential: parallel sends would defeat the round-robin
/// fairness of the cursor and can trip provider abuse detection. The
/// delay suspends only this sequence, never unrelated dispatch calls.
pub struct BulkSequencer {
    engine: Arc<DispatchEngine>,
    delay: Duration,
}

impl BulkSequencer {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self {
            engine,
            delay: Duration::from_millis(DEFAULT_BULK_DELAY_MS),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// One outcome per input request, in input order. An item's failure is
    /// captured and the sequence continues; the delay is skipped after the
    /// final item.
    pub async fn send_all(&self, requests: &[SendRequest]) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            let outcome = self.engine.dispatch(request).await;
            if let Err(ref e) = outcome {
                tracing::warn!(index, error = %e, "Bulk item failed; continuing");
            }
            outcomes.push(BulkOutcome { index, outcome });

            let is_last = index + 1 == requests.len();
            if !is_last && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        outcomes
    }
}
