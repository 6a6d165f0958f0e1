//! Core types for the campaign system.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient-record key that holds the destination address.
pub const RECIPIENT_EMAIL_KEY: &str = "email";

/// Arbitrary key/value record describing one recipient; every field is
/// available to `{{key}}` template substitution.
pub type RecipientRecord = serde_json::Map<String, serde_json::Value>;

/// One scheduled send event within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wave {
    pub send_at: DateTime<Utc>,
}

/// Campaign lifecycle. Waves individually pass through `Executing`;
/// the campaign is terminal once no pending wave timer remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Executing,
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Scheduled => write!(f, "scheduled"),
            CampaignStatus::Executing => write!(f, "executing"),
            CampaignStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "executing" => Ok(CampaignStatus::Executing),
            "completed" => Ok(CampaignStatus::Completed),
            other => Err(format!("unknown campaign status: {other}")),
        }
    }
}

/// A stored campaign definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub recipients: Vec<RecipientRecord>,
    pub subject_template: String,
    pub html_template: String,
    pub waves: Vec<Wave>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        name: impl Into<String>,
        recipients: Vec<RecipientRecord>,
        subject_template: impl Into<String>,
        html_template: impl Into<String>,
        waves: Vec<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            recipients,
            subject_template: subject_template.into(),
            html_template: html_template.into(),
            waves: waves.into_iter().map(|send_at| Wave { send_at }).collect(),
            status: CampaignStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of dispatching one wave message to one recipient, persisted per
/// wave index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveRecipientOutcome {
    pub recipient: String,
    pub success: bool,
    /// Provider message id on success, error detail on failure.
    pub detail: String,
}

impl WaveRecipientOutcome {
    pub fn delivered(recipient: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            success: true,
            detail: message_id.into(),
        }
    }

    pub fn failed(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            success: false,
            detail: error.into(),
        }
    }
}
