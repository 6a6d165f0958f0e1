//! Configuration types, built from environment variables.

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default daily quota for accounts outside the workspace domain.
pub const DEFAULT_STANDARD_QUOTA: u32 = 500;
/// Default daily quota for accounts on the workspace domain.
pub const DEFAULT_WORKSPACE_QUOTA: u32 = 2000;
/// Default inter-message delay for bulk sends, in milliseconds.
pub const DEFAULT_BULK_DELAY_MS: u64 = 5000;
/// Default daily reset schedule: local midnight (seconds-resolution cron).
pub const DEFAULT_RESET_SCHEDULE: &str = "0 0 0 * * * *";

/// One sending account as declared in `MAILROOM_ACCOUNTS` (a JSON array).
///
/// `daily_quota` overrides the domain-based quota policy for this account.
#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    pub address: String,
    pub password: SecretString,
    #[serde(default)]
    pub daily_quota: Option<u32>,
}

/// Configuration for the pool of quota-bound sending accounts.
#[derive(Debug)]
pub struct AccountsConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Addresses on this domain get the workspace (high-volume) quota;
    /// everything else gets the standard quota. Empty means no workspace
    /// domain is recognized.
    pub workspace_domain: String,
    pub standard_quota: u32,
    pub workspace_quota: u32,
    pub entries: Vec<AccountEntry>,
}

impl AccountsConfig {
    /// Build config from environment variables.
    ///
    /// `MAILROOM_SMTP_HOST` is required. `MAILROOM_ACCOUNTS` holds a JSON
    /// array of account entries; entries that fail to parse are skipped
    /// with a warning rather than failing startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let smtp_host = std::env::var("MAILROOM_SMTP_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("MAILROOM_SMTP_HOST".into()))?;

        let smtp_port: u16 = std::env::var("MAILROOM_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let workspace_domain = std::env::var("MAILROOM_WORKSPACE_DOMAIN").unwrap_or_default();

        let standard_quota: u32 = std::env::var("MAILROOM_STANDARD_QUOTA")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_STANDARD_QUOTA);

        let workspace_quota: u32 = std::env::var("MAILROOM_WORKSPACE_QUOTA")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WORKSPACE_QUOTA);

        let raw = std::env::var("MAILROOM_ACCOUNTS").unwrap_or_else(|_| "[]".to_string());
        let entries = parse_account_entries(&raw)?;

        Ok(Self {
            smtp_host,
            smtp_port,
            workspace_domain,
            standard_quota,
            workspace_quota,
            entries,
        })
    }
}

/// Parse the `MAILROOM_ACCOUNTS` JSON array, skipping malformed entries.
///
/// A malformed top-level value (not a JSON array) is a hard error; a
/// malformed element is skipped with a warning so one bad entry cannot
/// take down the whole pool.
pub fn parse_account_entries(raw: &str) -> Result<Vec<AccountEntry>, ConfigError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "MAILROOM_ACCOUNTS".into(),
            message: format!("not a JSON array: {e}"),
        })?;

    let mut entries = Vec::new();
    for value in values {
        match serde_json::from_value::<AccountEntry>(value) {
            Ok(entry) if entry.address.contains('@') => entries.push(entry),
            Ok(entry) => {
                tracing::warn!(address = %entry.address, "Skipping account with malformed address");
            }
            Err(e) => {
                tracing::warn!("Skipping malformed account entry: {e}");
            }
        }
    }
    Ok(entries)
}

/// Fallback relay configuration.
#[derive(Debug)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl RelayConfig {
    /// Build config from environment variables.
    /// Returns `None` if `MAILROOM_RELAY_HOST` is not set (relay disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("MAILROOM_RELAY_HOST").ok()?;

        let port: u16 = std::env::var("MAILROOM_RELAY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("MAILROOM_RELAY_USERNAME").unwrap_or_default();
        let password = SecretString::from(
            std::env::var("MAILROOM_RELAY_PASSWORD").unwrap_or_default(),
        );
        let from_address =
            std::env::var("MAILROOM_RELAY_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

/// Top-level service configuration.
#[derive(Debug)]
pub struct MailroomConfig {
    pub accounts: AccountsConfig,
    pub relay: Option<RelayConfig>,
    /// Cron expression for the daily quota reset, evaluated in local time.
    pub reset_schedule: String,
    pub db_path: String,
    pub http_port: u16,
    pub bulk_delay_ms: u64,
}

impl MailroomConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let accounts = AccountsConfig::from_env()?;
        let relay = RelayConfig::from_env();

        let reset_schedule = std::env::var("MAILROOM_RESET_SCHEDULE")
            .unwrap_or_else(|_| DEFAULT_RESET_SCHEDULE.to_string());

        let db_path = std::env::var("MAILROOM_DB_PATH")
            .unwrap_or_else(|_| "./data/mailroom.db".to_string());

        let http_port: u16 = std::env::var("MAILROOM_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let bulk_delay_ms: u64 = std::env::var("MAILROOM_BULK_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BULK_DELAY_MS);

        Ok(Self {
            accounts,
            relay,
            reset_schedule,
            db_path,
            http_port,
            bulk_delay_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accounts_valid() {
        let raw = r#"[
            {"address": "ana@agency.com", "password": "pw1"},
            {"address": "ben@agency.com", "password": "pw2", "daily_quota": 50}
        ]"#;
        let entries = parse_account_entries(raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, "ana@agency.com");
        assert_eq!(entries[1].daily_quota, Some(50));
    }

    #[test]
    fn parse_accounts_skips_malformed_entry() {
        let raw = r#"[
            {"address": "ana@agency.com", "password": "pw"},
            {"password": "no address"},
            {"address": "not-an-address", "password": "pw"}
        ]"#;
        let entries = parse_account_entries(raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "ana@agency.com");
    }

    #[test]
    fn parse_accounts_rejects_non_array() {
        assert!(parse_account_entries("{}").is_err());
        assert!(parse_account_entries("nonsense").is_err());
    }

    #[test]
    fn parse_accounts_empty() {
        let entries = parse_account_entries("[]").unwrap();
        assert!(entries.is_empty());
    }
}
