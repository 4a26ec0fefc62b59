//! PostgreSQL-backed usage record repository.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use tollbooth_application::{NewUsageRecord, UsageRecordRepository};
use tollbooth_core::{AppError, AppResult, ClientId, UserId};
use tollbooth_domain::{
    LedgerEntryId, RateCardId, UsageRecord, UsageRecordId, UsageStatus, WalletId,
};

/// PostgreSQL implementation of the usage record repository port.
#[derive(Clone)]
pub struct PostgresUsageRecordRepository {
    pool: PgPool,
}

impl PostgresUsageRecordRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UsageRow {
    id: uuid::Uuid,
    wallet_id: uuid::Uuid,
    rate_card_id: uuid::Uuid,
    ledger_entry_id: Option<uuid::Uuid>,
    template_id: Option<uuid::Uuid>,
    user_id: Option<uuid::Uuid>,
    client_id: uuid::Uuid,
    prompt_text: String,
    response_text: String,
    tokens_in: i64,
    tokens_out: i64,
    cost_cents: i64,
    status: String,
    blocked_reason: String,
    rating: Option<i16>,
    feedback: String,
    metadata: Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = AppError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        let status = UsageStatus::from_str(row.status.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored usage status '{}': {error}",
                row.status
            ))
        })?;

        Ok(Self {
            id: UsageRecordId::from_uuid(row.id),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            rate_card_id: RateCardId::from_uuid(row.rate_card_id),
            ledger_entry_id: row.ledger_entry_id.map(LedgerEntryId::from_uuid),
            template_id: row.template_id,
            user_id: row.user_id.map(UserId::from_uuid),
            client_id: ClientId::from_uuid(row.client_id),
            prompt_text: row.prompt_text,
            response_text: row.response_text,
            tokens_in: u64::try_from(row.tokens_in).map_err(|_| {
                AppError::Internal(format!("negative stored token count {}", row.tokens_in))
            })?,
            tokens_out: u64::try_from(row.tokens_out).map_err(|_| {
                AppError::Internal(format!("negative stored token count {}", row.tokens_out))
            })?,
            cost_cents: row.cost_cents,
            status,
            blocked_reason: row.blocked_reason,
            rating: row.rating,
            feedback: row.feedback,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

fn token_count(value: u64) -> AppResult<i64> {
    i64::try_from(value).map_err(|_| {
        AppError::Validation(format!("token count {value} exceeds the storable range"))
    })
}

#[async_trait]
impl UsageRecordRepository for PostgresUsageRecordRepository {
    async fn insert_record(&self, record: NewUsageRecord) -> AppResult<UsageRecord> {
        let tokens_in = token_count(record.tokens_in)?;
        let tokens_out = token_count(record.tokens_out)?;

        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            INSERT INTO usage_records
                (id, wallet_id, rate_card_id, ledger_entry_id, template_id, user_id,
                 client_id, prompt_text, response_text, tokens_in, tokens_out,
                 cost_cents, status, blocked_reason, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id, wallet_id, rate_card_id, ledger_entry_id, template_id, user_id,
                client_id, prompt_text, response_text, tokens_in, tokens_out, cost_cents,
                status, blocked_reason, rating, feedback, metadata, created_at
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(record.wallet_id.as_uuid())
        .bind(record.rate_card_id.as_uuid())
        .bind(record.ledger_entry_id.map(|entry_id| entry_id.as_uuid()))
        .bind(record.template_id)
        .bind(record.user_id.map(|user_id| user_id.as_uuid()))
        .bind(record.client_id.as_uuid())
        .bind(record.prompt_text.as_str())
        .bind(record.response_text.as_str())
        .bind(tokens_in)
        .bind(tokens_out)
        .bind(record.cost_cents)
        .bind(record.status.as_str())
        .bind(record.blocked_reason.as_str())
        .bind(record.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert usage record: {error}")))?;

        UsageRecord::try_from(row)
    }

    async fn find_record(&self, record_id: UsageRecordId) -> AppResult<Option<UsageRecord>> {
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT id, wallet_id, rate_card_id, ledger_entry_id, template_id, user_id,
                client_id, prompt_text, response_text, tokens_in, tokens_out, cost_cents,
                status, blocked_reason, rating, feedback, metadata, created_at
            FROM usage_records
            WHERE id = $1
            "#,
        )
        .bind(record_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find usage record: {error}")))?;

        row.map(UsageRecord::try_from).transpose()
    }

    async fn update_feedback(
        &self,
        record_id: UsageRecordId,
        rating: Option<i16>,
        feedback: String,
    ) -> AppResult<UsageRecord> {
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            UPDATE usage_records
            SET rating = $2, feedback = $3
            WHERE id = $1
            RETURNING id, wallet_id, rate_card_id, ledger_entry_id, template_id, user_id,
                client_id, prompt_text, response_text, tokens_in, tokens_out, cost_cents,
                status, blocked_reason, rating, feedback, metadata, created_at
            "#,
        )
        .bind(record_id.as_uuid())
        .bind(rating)
        .bind(feedback.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update usage feedback: {error}")))?
        .ok_or_else(|| AppError::NotFound(format!("usage record '{record_id}' was not found")))?;

        UsageRecord::try_from(row)
    }

    async fn list_records_for_client(&self, client_id: ClientId) -> AppResult<Vec<UsageRecord>> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT id, wallet_id, rate_card_id, ledger_entry_id, template_id, user_id,
                client_id, prompt_text, response_text, tokens_in, tokens_out, cost_cents,
                status, blocked_reason, rating, feedback, metadata, created_at
            FROM usage_records
            WHERE client_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list usage records: {error}")))?;

        rows.into_iter().map(UsageRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use tollbooth_core::AppError;

    use super::token_count;

    #[test]
    fn token_counts_within_range_pass_through() {
        assert!(matches!(token_count(1_500), Ok(1_500)));
    }

    #[test]
    fn token_counts_beyond_storage_range_are_rejected() {
        let result = token_count(u64::MAX);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
