//! Campaign scheduler — arms future waves and drives their execution.
//!
//! Each future wave becomes one deferred task that sleeps until its
//! timestamp and then runs the wave. Past-dated waves are skipped at
//! creation, never executed retroactively. There is no durable
//! re-scheduling: pending timers die with the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::campaign::model::{
    Campaign, CampaignStatus, RECIPIENT_EMAIL_KEY, RecipientRecord, WaveRecipientOutcome,
};
use crate::campaign::template;
use crate::dispatch::DispatchEngine;
use crate::error::CampaignError;
use crate::message::SendRequest;
use crate::store::CampaignStore;

struct CampaignProgress {
    status: CampaignStatus,
    pending_waves: usize,
}

/// Creates campaigns and fires their waves through the dispatch engine.
///
/// Cheap to clone; all fields are shared handles. Wave execution state is
/// tracked in-process, keeping the store contract narrow.
#[derive(Clone)]
pub struct CampaignScheduler {
    engine: Arc<DispatchEngine>,
    store: Arc<dyn CampaignStore>,
    progress: Arc<Mutex<HashMap<Uuid, CampaignProgress>>>,
}

impl CampaignScheduler {
    pub fn new(engine: Arc<DispatchEngine>, store: Arc<dyn CampaignStore>) -> Self {
        Self {
            engine,
            store,
            progress: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Persist a campaign and arm a deferred task per future wave.
    pub async fn create_campaign(
        &self,
        name: &str,
        recipients: Vec<RecipientRecord>,
        subject_template: &str,
        html_template: &str,
        waves: Vec<DateTime<Utc>>,
    ) -> Result<Uuid, CampaignError> {
        let campaign = Campaign::new(name, recipients, subject_template, html_template, waves);
        let id = self.store.create_campaign(&campaign).await?;

        let mut armed = 0;
        for (index, wave) in campaign.waves.iter().enumerate() {
            match (wave.send_at - Utc::now()).to_std() {
                Ok(wait) => {
                    armed += 1;
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(wait).await;
                        if let Err(e) = scheduler.run_wave(id, index).await {
                            tracing::error!(
                                campaign = %id,
                                wave = index,
                                error = %e,
                                "Wave execution failed"
                            );
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        campaign = %id,
                        wave = index,
                        send_at = %wave.send_at,
                        "Wave timestamp already past; skipping"
                    );
                }
            }
        }

        let status = if armed > 0 {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Completed
        };
        self.progress.lock().unwrap().insert(
            id,
            CampaignProgress {
                status,
                pending_waves: armed,
            },
        );

        tracing::info!(campaign = %id, name = %campaign.name, waves = armed, "Campaign created");
        Ok(id)
    }

    /// Execute one wave: re-read the definition, render per recipient,
    /// dispatch per recipient, persist the collected outcomes.
    ///
    /// One recipient's failure never halts the rest of the wave.
    pub async fn run_wave(
        &self,
        id: Uuid,
        wave_index: usize,
    ) -> Result<Vec<WaveRecipientOutcome>, CampaignError> {
        self.set_status(id, CampaignStatus::Executing);

        // Re-read so a definition mutated since creation is honored.
        let campaign = self
            .store
            .read_campaign(id)
            .await?
            .ok_or(CampaignError::NotFound(id))?;

        let mut outcomes = Vec::with_capacity(campaign.recipients.len());
        for record in &campaign.recipients {
            let Some(to) = record.get(RECIPIENT_EMAIL_KEY).and_then(|v| v.as_str()) else {
                outcomes.push(WaveRecipientOutcome::failed(
                    "<unknown>",
                    format!("recipient record has no '{RECIPIENT_EMAIL_KEY}' field"),
                ));
                continue;
            };

            let request = SendRequest {
                to: vec![to.to_string()],
                subject: template::render(&campaign.subject_template, record),
                html_body: template::render(&campaign.html_template, record),
                ..Default::default()
            };

            match self.engine.dispatch(&request).await {
                Ok(result) => {
                    outcomes.push(WaveRecipientOutcome::delivered(
                        to,
                        result.provider_message_id,
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        campaign = %id,
                        wave = wave_index,
                        recipient = %to,
                        error = %e,
                        "Wave recipient failed"
                    );
                    outcomes.push(WaveRecipientOutcome::failed(to, e.to_string()));
                }
            }
        }

        if let Err(e) = self.store.update_wave_result(id, wave_index, &outcomes).await {
            tracing::error!(
                campaign = %id,
                wave = wave_index,
                error = %e,
                "Failed to persist wave results"
            );
        }

        self.finish_wave(id);
        Ok(outcomes)
    }

    /// In-process status of a campaign created this run.
    pub fn status(&self, id: Uuid) -> Option<CampaignStatus> {
        self.progress.lock().unwrap().get(&id).map(|p| p.status)
    }

    /// Stored definition plus live status, for the read surface.
    pub async fn campaign(
        &self,
        id: Uuid,
    ) -> Result<Option<(Campaign, CampaignStatus)>, CampaignError> {
        let Some(campaign) = self.store.read_campaign(id).await? else {
            return Ok(None);
        };
        let status = self.status(id).unwrap_or(campaign.status);
        Ok(Some((campaign, status)))
    }

    fn set_status(&self, id: Uuid, status: CampaignStatus) {
        if let Some(progress) = self.progress.lock().unwrap().get_mut(&id) {
            progress.status = status;
        }
    }

    fn finish_wave(&self, id: Uuid) {
        let mut progress = self.progress.lock().unwrap();
        if let Some(p) = progress.get_mut(&id) {
            p.pending_waves = p.pending_waves.saturating_sub(1);
            p.status = if p.pending_waves == 0 {
                CampaignStatus::Completed
            } else {
                CampaignStatus::Scheduled
            };
        }
    }
}
