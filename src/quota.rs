//! Per-account daily send counters and the scheduled reset.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::pool::AccountPool;

/// Usage snapshot for one account, as exposed by stats.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountUsage {
    pub address: String,
    pub sent_today: u32,
    pub remaining: u32,
    pub daily_quota: u32,
}

/// Tracks `sent_today` per account against its fixed daily quota.
///
/// Counters only move forward via [`increment`](Self::increment), which
/// the dispatch engine calls after a confirmed successful send, and back
/// to zero via [`reset_all`](Self::reset_all) at the daily boundary. A
/// reset racing an in-flight send can mis-count by at most one message;
/// that is accepted rather than fenced with a transaction.
pub struct QuotaTracker {
    /// Fixed at construction, in pool order.
    quotas: Vec<(String, u32)>,
    sent: Mutex<HashMap<String, u32>>,
}

impl QuotaTracker {
    pub fn for_pool(pool: &AccountPool) -> Self {
        let quotas = pool
            .accounts()
            .iter()
            .map(|account| (account.address.clone(), account.daily_quota))
            .collect();
        Self {
            quotas,
            sent: Mutex::new(HashMap::new()),
        }
    }

    fn quota(&self, address: &str) -> u32 {
        self.quotas
            .iter()
            .find(|(addr, _)| addr == address)
            .map(|(_, quota)| *quota)
            .unwrap_or(0)
    }

    /// Count one confirmed send. Only called after admission by the
    /// selector, so the counter stays within the quota ceiling.
    pub fn increment(&self, address: &str) {
        let mut sent = self.sent.lock().unwrap();
        *sent.entry(address.to_string()).or_insert(0) += 1;
    }

    pub fn sent_today(&self, address: &str) -> u32 {
        self.sent
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn remaining(&self, address: &str) -> u32 {
        self.quota(address)
            .saturating_sub(self.sent_today(address))
    }

    /// Zero every counter. Idempotent; safe to run concurrently with
    /// in-flight increments (last writer wins).
    pub fn reset_all(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Per-account usage in pool order.
    pub fn snapshot(&self) -> Vec<AccountUsage> {
        let sent = self.sent.lock().unwrap();
        self.quotas
            .iter()
            .map(|(address, quota)| {
                let sent_today = sent.get(address).copied().unwrap_or(0);
                AccountUsage {
                    address: address.clone(),
                    sent_today,
                    remaining: quota.saturating_sub(sent_today),
                    daily_quota: *quota,
                }
            })
            .collect()
    }

    /// Sum of all configured quotas.
    pub fn total_capacity(&self) -> u32 {
        self.quotas.iter().map(|(_, quota)| quota).sum()
    }

    /// Sum of all counters.
    pub fn total_sent_today(&self) -> u32 {
        self.sent.lock().unwrap().values().sum()
    }
}

/// Spawn the daily reset ticker.
///
/// Sleeps until each upcoming fire time of `schedule` (evaluated in local
/// time, so the default lands on local midnight) and zeroes every counter.
pub fn spawn_daily_reset(
    tracker: Arc<QuotaTracker>,
    schedule: cron::Schedule,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(chrono::Local).next() else {
                tracing::warn!("Reset schedule has no upcoming fire time; ticker exiting");
                return;
            };
            let wait = (next - chrono::Local::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(wait).await;

            tracker.reset_all();
            tracing::info!("Daily quota counters reset");
        }
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use super::*;
    use crate::pool::{AccountClass, AccountPool, SendingAccount};
    use crate::transport::mock::MockTransport;

    fn pool(quotas: &[(&str, u32)]) -> AccountPool {
        AccountPool::new(
            quotas
                .iter()
                .map(|(address, quota)| {
                    SendingAccount::new(
                        *address,
                        AccountClass::Standard,
                        *quota,
                        Arc::new(MockTransport::new()),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn increment_and_remaining() {
        let tracker = QuotaTracker::for_pool(&pool(&[("ana@agency.com", 3)]));
        assert_eq!(tracker.remaining("ana@agency.com"), 3);
        tracker.increment("ana@agency.com");
        tracker.increment("ana@agency.com");
        assert_eq!(tracker.sent_today("ana@agency.com"), 2);
        assert_eq!(tracker.remaining("ana@agency.com"), 1);
    }

    #[test]
    fn unknown_account_has_zero_quota() {
        let tracker = QuotaTracker::for_pool(&pool(&[("ana@agency.com", 3)]));
        assert_eq!(tracker.remaining("ghost@agency.com"), 0);
    }

    #[test]
    fn reset_all_restores_full_quota() {
        let tracker = QuotaTracker::for_pool(&pool(&[
            ("ana@agency.com", 3),
            ("ben@agency.com", 5),
        ]));
        for _ in 0..3 {
            tracker.increment("ana@agency.com");
        }
        tracker.increment("ben@agency.com");

        tracker.reset_all();
        assert_eq!(tracker.remaining("ana@agency.com"), 3);
        assert_eq!(tracker.remaining("ben@agency.com"), 5);
    }

    #[test]
    fn reset_all_is_idempotent() {
        let tracker = QuotaTracker::for_pool(&pool(&[("ana@agency.com", 3)]));
        tracker.increment("ana@agency.com");
        tracker.reset_all();
        tracker.reset_all();
        assert_eq!(tracker.remaining("ana@agency.com"), 3);
    }

    #[test]
    fn snapshot_in_pool_order_with_totals() {
        let tracker = QuotaTracker::for_pool(&pool(&[
            ("ana@agency.com", 3),
            ("ben@agency.com", 5),
        ]));
        tracker.increment("ben@agency.com");

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[0].address, "ana@agency.com");
        assert_eq!(snapshot[0].sent_today, 0);
        assert_eq!(snapshot[1].address, "ben@agency.com");
        assert_eq!(snapshot[1].sent_today, 1);
        assert_eq!(snapshot[1].remaining, 4);

        assert_eq!(tracker.total_capacity(), 8);
        assert_eq!(tracker.total_sent_today(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_ticker_fires_on_schedule() {
        let tracker = Arc::new(QuotaTracker::for_pool(&pool(&[("ana@agency.com", 3)])));
        tracker.increment("ana@agency.com");

        // Every-second schedule; paused time auto-advances through the sleep.
        let schedule = cron::Schedule::from_str("* * * * * *").unwrap();
        let handle = spawn_daily_reset(Arc::clone(&tracker), schedule);

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(tracker.remaining("ana@agency.com"), 3);
        handle.abort();
    }
}
