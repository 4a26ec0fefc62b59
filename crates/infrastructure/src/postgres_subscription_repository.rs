//! PostgreSQL-backed subscription repository.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use tollbooth_application::SubscriptionRepository;
use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{Subscription, SubscriptionId, SubscriptionStatus};

/// PostgreSQL implementation of the subscription repository port.
#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: uuid::Uuid,
    client_id: uuid::Uuid,
    provider_customer_id: String,
    provider_subscription_id: String,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = AppError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::from_str(row.status.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored subscription status '{}': {error}",
                row.status
            ))
        })?;

        Ok(Self {
            id: SubscriptionId::from_uuid(row.id),
            client_id: ClientId::from_uuid(row.client_id),
            provider_customer_id: row.provider_customer_id,
            provider_subscription_id: row.provider_subscription_id,
            status,
            current_period_end: row.current_period_end,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert_subscription(&self, subscription: Subscription) -> AppResult<Subscription> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, client_id, provider_customer_id, provider_subscription_id,
                 status, current_period_end, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.client_id.as_uuid())
        .bind(subscription.provider_customer_id.as_str())
        .bind(subscription.provider_subscription_id.as_str())
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_end)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert subscription: {error}")))?;

        Ok(subscription)
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, client_id, provider_customer_id, provider_subscription_id,
                status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(subscription_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find subscription: {error}")))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn mark_active(
        &self,
        subscription_id: SubscriptionId,
        current_period_end: Option<DateTime<Utc>>,
    ) -> AppResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            UPDATE subscriptions
            SET status = $2, current_period_end = $3, updated_at = now()
            WHERE id = $1
            RETURNING id, client_id, provider_customer_id, provider_subscription_id,
                status, current_period_end, created_at, updated_at
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(current_period_end)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to activate subscription: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!("subscription '{subscription_id}' was not found"))
        })?;

        Subscription::try_from(row)
    }

    async fn cancel(&self, subscription_id: SubscriptionId) -> AppResult<Subscription> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            UPDATE subscriptions
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, client_id, provider_customer_id, provider_subscription_id,
                status, current_period_end, created_at, updated_at
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(SubscriptionStatus::Canceled.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to cancel subscription: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!("subscription '{subscription_id}' was not found"))
        })?;

        Subscription::try_from(row)
    }

    async fn list_subscriptions_for_client(
        &self,
        client_id: ClientId,
    ) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, client_id, provider_customer_id, provider_subscription_id,
                status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE client_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list subscriptions: {error}")))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
