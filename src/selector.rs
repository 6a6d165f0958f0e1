//! Quota-aware round-robin selection over the account pool.

use std::sync::Mutex;

use crate::pool::{AccountPool, SendingAccount};
use crate::quota::QuotaTracker;

/// Round-robin cursor over the pool's stable order.
///
/// Selection scans at most one full cycle from the cursor and returns the
/// first account with remaining quota, advancing the cursor to the slot
/// *after* it so consecutive sends fan out across accounts. An account one
/// message under quota is exactly as eligible as a fresh one; this is
/// fairness, not priority. A full cycle without a hit means the pool is
/// exhausted.
#[derive(Default)]
pub struct AccountSelector {
    cursor: Mutex<usize>,
}

impl AccountSelector {
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(0),
        }
    }

    /// Next eligible account, or `None` when the pool is exhausted
    /// (including the zero-account pool).
    ///
    /// The cursor moves past the returned account at selection time, so a
    /// send that later fails has still consumed its rotation turn.
    pub fn next_eligible<'a>(
        &self,
        pool: &'a AccountPool,
        tracker: &QuotaTracker,
    ) -> Option<&'a SendingAccount> {
        let accounts = pool.accounts();
        if accounts.is_empty() {
            return None;
        }

        let mut cursor = self.cursor.lock().unwrap();
        for step in 0..accounts.len() {
            let index = (*cursor + step) % accounts.len();
            let account = &accounts[index];
            if tracker.remaining(&account.address) > 0 {
                *cursor = (index + 1) % accounts.len();
                return Some(account);
            }
        }
        None
    }
}
