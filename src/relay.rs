//! Fallback relay — the capacity-unconstrained transport.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::error::TransportError;
use crate::message::Envelope;
use crate::transport::{ProviderReceipt, SmtpSender, Transport};

/// The overflow transport. Present only when relay credentials were
/// supplied at configuration time; has no quota.
pub struct Relay {
    from_address: String,
    transport: Arc<dyn Transport>,
}

impl Relay {
    pub fn new(from_address: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            from_address: from_address.into(),
            transport,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, TransportError> {
        let sender = SmtpSender::connect(
            &config.host,
            config.port,
            &config.username,
            &config.password,
        )?;
        tracing::info!(host = %config.host, from = %config.from_address, "Relay configured");
        Ok(Self::new(config.from_address.clone(), Arc::new(sender)))
    }

    /// Default sender identity for messages carried by the relay.
    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    /// Hand one message to the relay. Failures are not retried here.
    pub async fn send(&self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError> {
        self.transport.send(envelope).await
    }
}
