//! PostgreSQL-backed rate card repository.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use tollbooth_application::RateCardRepository;
use tollbooth_core::{AppError, AppResult};
use tollbooth_domain::{RateCard, RateCardId};

/// PostgreSQL implementation of the rate card repository port.
#[derive(Clone)]
pub struct PostgresRateCardRepository {
    pool: PgPool,
}

impl PostgresRateCardRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RateCardRow {
    id: uuid::Uuid,
    model: String,
    currency: String,
    input_cost_per_1k_cents: i64,
    output_cost_per_1k_cents: i64,
}

impl From<RateCardRow> for RateCard {
    fn from(row: RateCardRow) -> Self {
        Self {
            id: RateCardId::from_uuid(row.id),
            model: row.model,
            currency: row.currency,
            input_cost_per_1k_cents: row.input_cost_per_1k_cents,
            output_cost_per_1k_cents: row.output_cost_per_1k_cents,
        }
    }
}

#[async_trait]
impl RateCardRepository for PostgresRateCardRepository {
    async fn create_rate_card(&self, rate_card: RateCard) -> AppResult<RateCard> {
        sqlx::query(
            r#"
            INSERT INTO rate_cards (id, model, currency, input_cost_per_1k_cents, output_cost_per_1k_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(rate_card.id.as_uuid())
        .bind(rate_card.model.as_str())
        .bind(rate_card.currency.as_str())
        .bind(rate_card.input_cost_per_1k_cents)
        .bind(rate_card.output_cost_per_1k_cents)
        .execute(&self.pool)
        .await
        .map_err(|error| map_rate_card_conflict(error, &rate_card))?;

        Ok(rate_card)
    }

    async fn find_rate_card(&self, rate_card_id: RateCardId) -> AppResult<Option<RateCard>> {
        let row = sqlx::query_as::<_, RateCardRow>(
            r#"
            SELECT id, model, currency, input_cost_per_1k_cents, output_cost_per_1k_cents
            FROM rate_cards
            WHERE id = $1
            "#,
        )
        .bind(rate_card_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find rate card: {error}")))?;

        Ok(row.map(RateCard::from))
    }

    async fn find_rate_card_for_model(
        &self,
        model: &str,
        currency: &str,
    ) -> AppResult<Option<RateCard>> {
        let row = sqlx::query_as::<_, RateCardRow>(
            r#"
            SELECT id, model, currency, input_cost_per_1k_cents, output_cost_per_1k_cents
            FROM rate_cards
            WHERE model = $1 AND currency = $2
            "#,
        )
        .bind(model)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find rate card: {error}")))?;

        Ok(row.map(RateCard::from))
    }
}

fn map_rate_card_conflict(error: sqlx::Error, rate_card: &RateCard) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "rate card for model '{}' in '{}' already exists",
            rate_card.model, rate_card.currency
        ));
    }

    AppError::Internal(format!("failed to create rate card: {error}"))
}
