//! HashMap-backed campaign store for unit tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::campaign::model::{Campaign, WaveRecipientOutcome};
use crate::error::StoreError;
use crate::store::traits::CampaignStore;

#[derive(Default)]
pub struct MemoryStore {
    campaigns: Mutex<HashMap<Uuid, Campaign>>,
    wave_results: Mutex<HashMap<(Uuid, usize), Vec<WaveRecipientOutcome>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted results for one wave, if any.
    pub fn wave_results(&self, id: Uuid, wave_index: usize) -> Option<Vec<WaveRecipientOutcome>> {
        self.wave_results
            .lock()
            .unwrap()
            .get(&(id, wave_index))
            .cloned()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<Uuid, StoreError> {
        self.campaigns
            .lock()
            .unwrap()
            .insert(campaign.id, campaign.clone());
        Ok(campaign.id)
    }

    async fn read_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        Ok(self.campaigns.lock().unwrap().get(&id).cloned())
    }

    async fn update_wave_result(
        &self,
        id: Uuid,
        wave_index: usize,
        results: &[WaveRecipientOutcome],
    ) -> Result<(), StoreError> {
        self.wave_results
            .lock()
            .unwrap()
            .insert((id, wave_index), results.to_vec());
        Ok(())
    }
}
