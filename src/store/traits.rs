//! The campaign store contract.
//!
//! Deliberately narrow: the scheduler only ever creates a definition,
//! re-reads it at wave time, and appends per-wave results.

use async_trait::async_trait;
use uuid::Uuid;

use crate::campaign::model::{Campaign, WaveRecipientOutcome};
use crate::error::StoreError;

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Persist a new campaign definition. Returns the stored id.
    async fn create_campaign(&self, campaign: &Campaign) -> Result<Uuid, StoreError>;

    /// Read a campaign definition by id.
    async fn read_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    /// Persist the per-recipient results of one executed wave.
    async fn update_wave_result(
        &self,
        id: Uuid,
        wave_index: usize,
        results: &[WaveRecipientOutcome],
    ) -> Result<(), StoreError>;
}
