//! In-memory usage record repository for tests and local development.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use tollbooth_application::{NewUsageRecord, UsageRecordRepository};
use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{UsageRecord, UsageRecordId};

/// In-memory implementation of the usage record repository port.
///
/// Records are kept in insertion order so client listings can be served
/// newest first without relying on timestamp precision.
#[derive(Debug, Default)]
pub struct InMemoryUsageRecordRepository {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageRecordRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRecordRepository for InMemoryUsageRecordRepository {
    async fn insert_record(&self, record: NewUsageRecord) -> AppResult<UsageRecord> {
        let stored = UsageRecord {
            id: UsageRecordId::new(),
            wallet_id: record.wallet_id,
            rate_card_id: record.rate_card_id,
            ledger_entry_id: record.ledger_entry_id,
            template_id: record.template_id,
            user_id: record.user_id,
            client_id: record.client_id,
            prompt_text: record.prompt_text,
            response_text: record.response_text,
            tokens_in: record.tokens_in,
            tokens_out: record.tokens_out,
            cost_cents: record.cost_cents,
            status: record.status,
            blocked_reason: record.blocked_reason,
            rating: None,
            feedback: String::new(),
            metadata: record.metadata,
            created_at: Utc::now(),
        };

        self.records.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn find_record(&self, record_id: UsageRecordId) -> AppResult<Option<UsageRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|record| record.id == record_id)
            .cloned())
    }

    async fn update_feedback(
        &self,
        record_id: UsageRecordId,
        rating: Option<i16>,
        feedback: String,
    ) -> AppResult<UsageRecord> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("usage record '{record_id}' was not found"))
            })?;

        record.rating = rating;
        record.feedback = feedback;
        Ok(record.clone())
    }

    async fn list_records_for_client(&self, client_id: ClientId) -> AppResult<Vec<UsageRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .filter(|record| record.client_id == client_id)
            .cloned()
            .collect())
    }
}
