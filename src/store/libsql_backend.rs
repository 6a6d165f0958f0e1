//! libSQL backend — async `CampaignStore` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::campaign::model::{Campaign, CampaignStatus, RecipientRecord, Wave, WaveRecipientOutcome};
use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::CampaignStore;

/// libSQL campaign store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Campaign store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    /// All persisted wave results for a campaign, ordered by wave index.
    pub async fn wave_results(
        &self,
        id: Uuid,
    ) -> Result<Vec<(usize, Vec<WaveRecipientOutcome>)>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT wave_index, results FROM campaign_wave_results
                 WHERE campaign_id = ?1 ORDER BY wave_index",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            let wave_index: i64 = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
            let results_json: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
            let results: Vec<WaveRecipientOutcome> = serde_json::from_str(&results_json)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            out.push((wave_index as usize, results));
        }
        Ok(out)
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, StoreError> {
    let id_str: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
    let name: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
    let recipients_json: String = row.get(2).map_err(|e| StoreError::Query(e.to_string()))?;
    let subject_template: String = row.get(3).map_err(|e| StoreError::Query(e.to_string()))?;
    let html_template: String = row.get(4).map_err(|e| StoreError::Query(e.to_string()))?;
    let waves_json: String = row.get(5).map_err(|e| StoreError::Query(e.to_string()))?;
    let status_str: String = row.get(6).map_err(|e| StoreError::Query(e.to_string()))?;
    let created_str: String = row.get(7).map_err(|e| StoreError::Query(e.to_string()))?;
    let updated_str: String = row.get(8).map_err(|e| StoreError::Query(e.to_string()))?;

    let recipients: Vec<RecipientRecord> = serde_json::from_str(&recipients_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let waves: Vec<Wave> = serde_json::from_str(&waves_json)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(Campaign {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name,
        recipients,
        subject_template,
        html_template,
        waves,
        status: status_str.parse().unwrap_or(CampaignStatus::Draft),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl CampaignStore for LibSqlStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<Uuid, StoreError> {
        let recipients = serde_json::to_string(&campaign.recipients)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let waves = serde_json::to_string(&campaign.waves)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO campaigns
                 (id, name, recipients, subject_template, html_template, waves, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    campaign.id.to_string(),
                    campaign.name.clone(),
                    recipients,
                    campaign.subject_template.clone(),
                    campaign.html_template.clone(),
                    waves,
                    campaign.status.to_string(),
                    campaign.created_at.to_rfc3339(),
                    campaign.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to insert campaign: {e}")))?;

        Ok(campaign.id)
    }

    async fn read_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, recipients, subject_template, html_template, waves, status, created_at, updated_at
                 FROM campaigns WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_campaign(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_wave_result(
        &self,
        id: Uuid,
        wave_index: usize,
        results: &[WaveRecipientOutcome],
    ) -> Result<(), StoreError> {
        let results_json = serde_json::to_string(results)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT OR REPLACE INTO campaign_wave_results
                 (campaign_id, wave_index, results, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), wave_index as i64, results_json, now.clone()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("Failed to store wave result: {e}")))?;

        self.conn
            .execute(
                "UPDATE campaigns SET updated_at = ?1 WHERE id = ?2",
                params![now, id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign() -> Campaign {
        let mut record = RecipientRecord::new();
        record.insert("email".into(), serde_json::json!("ana@client.com"));
        record.insert("name".into(), serde_json::json!("Ana"));
        Campaign::new(
            "spring-launch",
            vec![record],
            "Hi {{name}}",
            "<p>Hi {{name}}</p>",
            vec![Utc::now()],
        )
    }

    #[tokio::test]
    async fn campaign_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let original = campaign();
        let id = store.create_campaign(&original).await.unwrap();

        let loaded = store.read_campaign(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "spring-launch");
        assert_eq!(loaded.subject_template, "Hi {{name}}");
        assert_eq!(loaded.recipients.len(), 1);
        assert_eq!(loaded.waves.len(), 1);
        assert_eq!(loaded.status, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn missing_campaign_reads_as_none() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.read_campaign(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wave_results_persist_per_index() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let id = store.create_campaign(&campaign()).await.unwrap();

        store
            .update_wave_result(
                id,
                0,
                &[WaveRecipientOutcome::delivered("ana@client.com", "q1")],
            )
            .await
            .unwrap();
        store
            .update_wave_result(
                id,
                1,
                &[WaveRecipientOutcome::failed("ana@client.com", "boom")],
            )
            .await
            .unwrap();

        let results = store.wave_results(id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert!(results[0].1[0].success);
        assert_eq!(results[1].0, 1);
        assert!(!results[1].1[0].success);
    }

    #[tokio::test]
    async fn wave_result_rewrite_replaces_previous() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let id = store.create_campaign(&campaign()).await.unwrap();

        store
            .update_wave_result(id, 0, &[WaveRecipientOutcome::failed("a@x.com", "err")])
            .await
            .unwrap();
        store
            .update_wave_result(id, 0, &[WaveRecipientOutcome::delivered("a@x.com", "q9")])
            .await
            .unwrap();

        let results = store.wave_results(id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1[0].success);
    }

    #[tokio::test]
    async fn local_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailroom.db");

        let id = {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.create_campaign(&campaign()).await.unwrap()
        };

        let store = LibSqlStore::new_local(&path).await.unwrap();
        assert!(store.read_campaign(id).await.unwrap().is_some());
    }
}
