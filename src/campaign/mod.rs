//! Multi-wave, templated, future-dated campaign sends.

pub mod model;
pub mod scheduler;
pub mod template;

pub use model::{Campaign, CampaignStatus, RecipientRecord, Wave, WaveRecipientOutcome};
pub use scheduler::CampaignScheduler;
