//! The pool of configured sending accounts.

use std::sync::Arc;

use crate::config::AccountsConfig;
use crate::transport::{SmtpSender, Transport};

/// Capability class of a sending account, derived from its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountClass {
    Standard,
    HighVolume,
}

/// One quota-bound sending identity. Immutable for the process lifetime;
/// the transport handle is owned here and nowhere else.
pub struct SendingAccount {
    pub address: String,
    pub class: AccountClass,
    pub daily_quota: u32,
    transport: Arc<dyn Transport>,
}

impl SendingAccount {
    pub fn new(
        address: impl Into<String>,
        class: AccountClass,
        daily_quota: u32,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            address: address.into(),
            class,
            daily_quota,
            transport,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

/// Ordered, stable list of sending accounts. The order fixes the
/// round-robin sequence for the lifetime of the process.
pub struct AccountPool {
    accounts: Vec<SendingAccount>,
}

impl AccountPool {
    pub fn new(accounts: Vec<SendingAccount>) -> Self {
        if accounts.is_empty() {
            tracing::warn!(
                "No sending accounts configured; dispatch will be relay-only"
            );
        }
        Self { accounts }
    }

    /// Build the pool from configuration.
    ///
    /// Quota policy: addresses on the workspace domain get the workspace
    /// quota, everything else the standard quota; an explicit
    /// `daily_quota` on the entry overrides both. Entries whose transport
    /// cannot be set up are skipped with a warning.
    pub fn from_config(config: &AccountsConfig) -> Self {
        let mut accounts = Vec::new();

        for entry in &config.entries {
            let class = classify(&entry.address, &config.workspace_domain);
            let daily_quota = entry.daily_quota.unwrap_or(match class {
                AccountClass::Standard => config.standard_quota,
                AccountClass::HighVolume => config.workspace_quota,
            });

            let sender = match SmtpSender::connect(
                &config.smtp_host,
                config.smtp_port,
                &entry.address,
                &entry.password,
            ) {
                Ok(sender) => sender,
                Err(e) => {
                    tracing::warn!(address = %entry.address, error = %e, "Skipping account");
                    continue;
                }
            };

            tracing::info!(
                address = %entry.address,
                quota = daily_quota,
                class = ?class,
                "Sending account registered"
            );
            accounts.push(SendingAccount::new(
                entry.address.clone(),
                class,
                daily_quota,
                Arc::new(sender),
            ));
        }

        Self::new(accounts)
    }

    pub fn accounts(&self) -> &[SendingAccount] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Domain-based capability classification.
fn classify(address: &str, workspace_domain: &str) -> AccountClass {
    if workspace_domain.is_empty() {
        return AccountClass::Standard;
    }
    let domain = address.rsplit('@').next().unwrap_or_default();
    if domain.eq_ignore_ascii_case(workspace_domain) {
        AccountClass::HighVolume
    } else {
        AccountClass::Standard
    }
}
