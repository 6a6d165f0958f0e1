//! Dispatch engine — executes one logical send end to end.
//!
//! Chooses a pool account (or the relay), resolves the outbound message,
//! invokes the transport, accounts the send, and records the outcome to
//! the log sink. No retries: a failed send surfaces to the caller, and the
//! failed account has already consumed its rotation turn.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::DispatchError;
use crate::message::{
    Envelope, RELAY_ROUTE_TAG, RemainingQuota, SendRequest, SendResult, TransportKind,
};
use crate::pool::{AccountPool, SendingAccount};
use crate::quota::{AccountUsage, QuotaTracker};
use crate::relay::Relay;
use crate::selector::AccountSelector;
use crate::sink::{DispatchRecord, LogSink, RecordOutcome};

/// Aggregate usage view across the pool and relay.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub per_account: Vec<AccountUsage>,
    pub relay_available: bool,
    pub total_sent_today: u32,
    /// Sum of pool quotas, or unlimited when a relay is configured.
    pub total_capacity: RemainingQuota,
}

/// Orchestrates single sends over the shared pool/tracker/selector state.
///
/// One engine instance owns its cursor and counters, so several engines
/// (e.g. per tenant) can coexist without cross-talk.
pub struct DispatchEngine {
    pool: AccountPool,
    tracker: Arc<QuotaTracker>,
    selector: AccountSelector,
    relay: Option<Relay>,
    sink: Arc<dyn LogSink>,
}

impl DispatchEngine {
    pub fn new(pool: AccountPool, relay: Option<Relay>, sink: Arc<dyn LogSink>) -> Self {
        let tracker = Arc::new(QuotaTracker::for_pool(&pool));
        Self {
            pool,
            tracker,
            selector: AccountSelector::new(),
            relay,
            sink,
        }
    }

    pub fn tracker(&self) -> &Arc<QuotaTracker> {
        &self.tracker
    }

    pub fn relay_available(&self) -> bool {
        self.relay.is_some()
    }

    /// Execute one logical send.
    ///
    /// Routing order: forced relay, then the round-robin pool, then relay
    /// escalation on pool exhaustion. A message is only refused once no
    /// delivery path remains.
    pub async fn dispatch(&self, request: &SendRequest) -> Result<SendResult, DispatchError> {
        if request.to.is_empty() {
            let err = DispatchError::InvalidMessage("no recipients".into());
            self.record(request, "none", Err(&err)).await;
            return Err(err);
        }

        if request.force_relay {
            if let Some(relay) = &self.relay {
                return self.dispatch_via_relay(request, relay).await;
            }
        }

        match self.selector.next_eligible(&self.pool, &self.tracker) {
            Some(account) => self.dispatch_via_account(request, account).await,
            None => match &self.relay {
                Some(relay) => {
                    tracing::debug!("Pool exhausted; escalating to relay");
                    self.dispatch_via_relay(request, relay).await
                }
                None => {
                    let err = DispatchError::AllCapacityExhausted;
                    self.record(request, "none", Err(&err)).await;
                    Err(err)
                }
            },
        }
    }

    /// Send on behalf of an arbitrary caller-supplied identity.
    ///
    /// The visible sender and reply-to become `identity`; the actual
    /// transport is still chosen by the selector (or relay) and remains
    /// identifiable via the routing-trace header. Callers are trusted.
    pub async fn send_as_client(
        &self,
        identity: &str,
        to: Vec<String>,
        subject: &str,
        html_body: &str,
    ) -> Result<SendResult, DispatchError> {
        let request = SendRequest {
            from: Some(identity.to_string()),
            reply_to: Some(identity.to_string()),
            to,
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            ..Default::default()
        };
        self.dispatch(&request).await
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            per_account: self.tracker.snapshot(),
            relay_available: self.relay.is_some(),
            total_sent_today: self.tracker.total_sent_today(),
            total_capacity: if self.relay.is_some() {
                RemainingQuota::Unlimited
            } else {
                RemainingQuota::Limited(self.tracker.total_capacity())
            },
        }
    }

    async fn dispatch_via_account(
        &self,
        request: &SendRequest,
        account: &SendingAccount,
    ) -> Result<SendResult, DispatchError> {
        let envelope = Envelope::from_request(request, &account.address, &account.address);
        let transport_label = format!("account:{}", account.address);

        match account.transport().send(&envelope).await {
            Ok(receipt) => {
                self.tracker.increment(&account.address);
                let result = SendResult {
                    provider_message_id: receipt.provider_message_id,
                    transport_used: TransportKind::Account {
                        address: account.address.clone(),
                    },
                    remaining: RemainingQuota::Limited(self.tracker.remaining(&account.address)),
                };
                self.record(request, &transport_label, Ok(&result)).await;
                Ok(result)
            }
            Err(e) => {
                let err = DispatchError::AccountTransport {
                    address: account.address.clone(),
                    reason: e.to_string(),
                };
                self.record(request, &transport_label, Err(&err)).await;
                Err(err)
            }
        }
    }

    async fn dispatch_via_relay(
        &self,
        request: &SendRequest,
        relay: &Relay,
    ) -> Result<SendResult, DispatchError> {
        let envelope = Envelope::from_request(request, relay.from_address(), RELAY_ROUTE_TAG);

        match relay.send(&envelope).await {
            Ok(receipt) => {
                let result = SendResult {
                    provider_message_id: receipt.provider_message_id,
                    transport_used: TransportKind::Relay,
                    remaining: RemainingQuota::Unlimited,
                };
                self.record(request, RELAY_ROUTE_TAG, Ok(&result)).await;
                Ok(result)
            }
            Err(e) => {
                let err = DispatchError::RelayTransport {
                    reason: e.to_string(),
                };
                self.record(request, RELAY_ROUTE_TAG, Err(&err)).await;
                Err(err)
            }
        }
    }

    /// Record the outcome to the sink. Sink failures are swallowed; a
    /// user-facing send never blocks or fails on observability.
    async fn record(
        &self,
        request: &SendRequest,
        transport: &str,
        outcome: Result<&SendResult, &DispatchError>,
    ) {
        let record = DispatchRecord {
            at: Utc::now(),
            transport: transport.to_string(),
            recipients: request.to.clone(),
            subject: request.subject.clone(),
            outcome: match outcome {
                Ok(result) => RecordOutcome::Delivered {
                    provider_message_id: result.provider_message_id.clone(),
                },
                Err(e) => RecordOutcome::Failed {
                    error: e.to_string(),
                },
            },
        };
        if let Err(e) = self.sink.record(&record).await {
            tracing::warn!(error = %e, "Dispatch log sink failed; outcome not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ROUTE_HEADER;
    use crate::pool::AccountClass;
    use crate::sink::{FailingSink, MemorySink};
    use crate::transport::Transport;
    use crate::transport::mock::MockTransport;

    struct Harness {
        engine: DispatchEngine,
        transports: Vec<Arc<MockTransport>>,
        relay_transport: Option<Arc<MockTransport>>,
        sink: Arc<MemorySink>,
    }

    fn harness(quotas: &[(&str, u32)], with_relay: bool) -> Harness {
        let transports: Vec<Arc<MockTransport>> = quotas
            .iter()
            .map(|_| Arc::new(MockTransport::new()))
            .collect();
        let accounts = quotas
            .iter()
            .zip(&transports)
            .map(|((address, quota), transport)| {
                SendingAccount::new(
                    *address,
                    AccountClass::Standard,
                    *quota,
                    Arc::clone(transport) as Arc<dyn Transport>,
                )
            })
            .collect();

        let relay_transport = with_relay.then(|| Arc::new(MockTransport::new()));
        let relay = relay_transport.as_ref().map(|transport| {
            Relay::new(
                "relay@agency.com",
                Arc::clone(transport) as Arc<dyn Transport>,
            )
        });

        let sink = Arc::new(MemorySink::new());
        let engine = DispatchEngine::new(
            AccountPool::new(accounts),
            relay,
            Arc::clone(&sink) as Arc<dyn LogSink>,
        );
        Harness {
            engine,
            transports,
            relay_transport,
            sink,
        }
    }

    fn request() -> SendRequest {
        SendRequest {
            to: vec!["lead@client.com".into()],
            subject: "Hello".into(),
            html_body: "<p>Hi</p>".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_account_runs_down_quota_then_exhausts() {
        let h = harness(&[("ana@agency.com", 2)], false);

        let first = h.engine.dispatch(&request()).await.unwrap();
        assert_eq!(first.remaining, RemainingQuota::Limited(1));

        let second = h.engine.dispatch(&request()).await.unwrap();
        assert_eq!(second.remaining, RemainingQuota::Limited(0));

        let third = h.engine.dispatch(&request()).await;
        assert!(matches!(third, Err(DispatchError::AllCapacityExhausted)));
        assert_eq!(h.transports[0].sent_count(), 2);
    }

    #[tokio::test]
    async fn fair_rotation_across_accounts() {
        let h = harness(
            &[("a@x.com", 10), ("b@x.com", 10), ("c@x.com", 10)],
            false,
        );
        for _ in 0..6 {
            h.engine.dispatch(&request()).await.unwrap();
        }
        for transport in &h.transports {
            assert_eq!(transport.sent_count(), 2);
        }
    }

    #[tokio::test]
    async fn exhausted_pool_escalates_to_relay() {
        let h = harness(&[("ana@agency.com", 1)], true);

        let first = h.engine.dispatch(&request()).await.unwrap();
        assert!(matches!(first.transport_used, TransportKind::Account { .. }));

        let second = h.engine.dispatch(&request()).await.unwrap();
        assert_eq!(second.transport_used, TransportKind::Relay);
        assert_eq!(second.remaining, RemainingQuota::Unlimited);
        assert_eq!(h.relay_transport.as_ref().unwrap().sent_count(), 1);
    }

    #[tokio::test]
    async fn force_relay_bypasses_pool() {
        let h = harness(&[("ana@agency.com", 5)], true);

        let mut req = request();
        req.force_relay = true;
        let result = h.engine.dispatch(&req).await.unwrap();

        assert_eq!(result.transport_used, TransportKind::Relay);
        assert_eq!(h.transports[0].sent_count(), 0);
        // Pool quota untouched.
        assert_eq!(h.engine.tracker().remaining("ana@agency.com"), 5);
    }

    #[tokio::test]
    async fn force_relay_without_relay_falls_back_to_pool() {
        let h = harness(&[("ana@agency.com", 5)], false);

        let mut req = request();
        req.force_relay = true;
        let result = h.engine.dispatch(&req).await.unwrap();
        assert!(matches!(result.transport_used, TransportKind::Account { .. }));
    }

    #[tokio::test]
    async fn empty_pool_without_relay_fails_immediately() {
        let h = harness(&[], false);
        let result = h.engine.dispatch(&request()).await;
        assert!(matches!(result, Err(DispatchError::AllCapacityExhausted)));
    }

    #[tokio::test]
    async fn empty_pool_with_relay_degrades_to_relay_only() {
        let h = harness(&[], true);
        let result = h.engine.dispatch(&request()).await.unwrap();
        assert_eq!(result.transport_used, TransportKind::Relay);
    }

    #[tokio::test]
    async fn failed_send_surfaces_error_and_consumes_turn() {
        let h = harness(&[("a@x.com", 5), ("b@x.com", 5)], false);
        h.transports[0].set_failing(true);

        let first = h.engine.dispatch(&request()).await;
        assert!(matches!(
            first,
            Err(DispatchError::AccountTransport { ref address, .. }) if address == "a@x.com"
        ));
        // No accounting for the failed attempt.
        assert_eq!(h.engine.tracker().sent_today("a@x.com"), 0);

        // The broken account consumed its turn; the next call moves on to b.
        let second = h.engine.dispatch(&request()).await.unwrap();
        assert!(matches!(
            second.transport_used,
            TransportKind::Account { ref address } if address == "b@x.com"
        ));
    }

    #[tokio::test]
    async fn relay_failure_surfaces_as_relay_transport_error() {
        let h = harness(&[], true);
        h.relay_transport.as_ref().unwrap().set_failing(true);

        let result = h.engine.dispatch(&request()).await;
        assert!(matches!(result, Err(DispatchError::RelayTransport { .. })));
    }

    #[tokio::test]
    async fn empty_recipients_rejected_without_consuming_rotation() {
        let h = harness(&[("ana@agency.com", 5)], false);

        let mut req = request();
        req.to.clear();
        let result = h.engine.dispatch(&req).await;
        assert!(matches!(result, Err(DispatchError::InvalidMessage(_))));
        assert_eq!(h.transports[0].sent_count(), 0);
    }

    #[tokio::test]
    async fn outcomes_are_recorded_to_sink() {
        let h = harness(&[("ana@agency.com", 1)], false);

        h.engine.dispatch(&request()).await.unwrap();
        let _ = h.engine.dispatch(&request()).await;

        let records = h.sink.records();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].outcome, RecordOutcome::Delivered { .. }));
        assert!(matches!(records[1].outcome, RecordOutcome::Failed { .. }));
        assert_eq!(records[0].transport, "account:ana@agency.com");
    }

    #[tokio::test]
    async fn sink_failure_does_not_affect_send_result() {
        let transport = Arc::new(MockTransport::new());
        let pool = AccountPool::new(vec![SendingAccount::new(
            "ana@agency.com",
            AccountClass::Standard,
            5,
            Arc::clone(&transport) as Arc<dyn Transport>,
        )]);
        let engine = DispatchEngine::new(pool, None, Arc::new(FailingSink));

        let result = engine.dispatch(&request()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_as_client_spoofs_visible_identity_only() {
        let h = harness(&[("ana@agency.com", 5)], false);

        h.engine
            .send_as_client(
                "ceo@brand.com",
                vec!["lead@client.com".into()],
                "On behalf",
                "<p>Hi</p>",
            )
            .await
            .unwrap();

        let sent = h.transports[0].sent.lock().unwrap();
        assert_eq!(sent[0].from, "ceo@brand.com");
        assert_eq!(sent[0].reply_to, "ceo@brand.com");
        // Trace header still identifies the real transport account.
        assert_eq!(
            sent[0].headers[0],
            (ROUTE_HEADER.to_string(), "ana@agency.com".to_string())
        );
    }

    #[tokio::test]
    async fn stats_reflect_usage_and_capacity() {
        let h = harness(&[("a@x.com", 2), ("b@x.com", 3)], false);
        h.engine.dispatch(&request()).await.unwrap();

        let stats = h.engine.stats();
        assert!(!stats.relay_available);
        assert_eq!(stats.total_sent_today, 1);
        assert_eq!(stats.total_capacity, RemainingQuota::Limited(5));
        assert_eq!(stats.per_account.len(), 2);
        assert_eq!(stats.per_account[0].sent_today, 1);
    }

    #[tokio::test]
    async fn stats_capacity_unlimited_with_relay() {
        let h = harness(&[("a@x.com", 2)], true);
        let stats = h.engine.stats();
        assert!(stats.relay_available);
        assert_eq!(stats.total_capacity, RemainingQuota::Unlimited);
    }
}
