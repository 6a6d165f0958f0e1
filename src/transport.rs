//! Transport seam — SMTP via lettre for real sends, mock for tests.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport as LettreTransport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::TransportError;
use crate::message::Envelope;

/// Receipt returned by the provider for an accepted message.
#[derive(Debug, Clone)]
pub struct ProviderReceipt {
    pub provider_message_id: String,
}

/// A way to hand one message to a mail provider.
///
/// Implementations do not retry; failure handling is the dispatch
/// engine's call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError>;
}

/// SMTP transport handle for one account (or the relay).
///
/// The lettre transport is blocking, so sends run under
/// `tokio::task::spawn_blocking`; the handle itself is built once at
/// configuration time and reused for every send.
pub struct SmtpSender {
    transport: SmtpTransport,
}

impl SmtpSender {
    pub fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &SecretString,
    ) -> Result<Self, TransportError> {
        let creds = Credentials::new(
            username.to_string(),
            password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(host)
            .map_err(|e| TransportError::Connect(format!("SMTP relay error: {e}")))?
            .port(port)
            .credentials(creds)
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl Transport for SmtpSender {
    async fn send(&self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError> {
        let message = envelope.to_mime()?;
        let transport = self.transport.clone();

        let response = tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| TransportError::Send(format!("send task panicked: {e}")))?
            .map_err(|e| TransportError::Send(e.to_string()))?;

        // The provider's queue id comes back on the accept line.
        let provider_message_id = response.message().collect::<Vec<_>>().join(" ");
        Ok(ProviderReceipt {
            provider_message_id,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory transport double shared by the unit tests.

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Records every envelope it is given; optionally fails every send.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<Envelope>>,
        failing: AtomicBool,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let transport = Self::default();
            transport.failing.store(true, Ordering::Relaxed);
            transport
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::Relaxed);
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, envelope: &Envelope) -> Result<ProviderReceipt, TransportError> {
            if self.failing.load(Ordering::Relaxed) {
                return Err(TransportError::Send("mock transport down".into()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(envelope.clone());
            Ok(ProviderReceipt {
                provider_message_id: format!("mock-{}", sent.len()),
            })
        }
    }
}
