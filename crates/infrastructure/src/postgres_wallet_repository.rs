//! PostgreSQL-backed wallet and ledger repository.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use tollbooth_application::WalletRepository;
use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{LedgerEntryId, LedgerReason, Wallet, WalletId, WalletLedgerEntry};

/// PostgreSQL implementation of the wallet repository port.
///
/// `apply_delta` takes a row lock on the wallet so concurrent balance
/// changes serialize per wallet; the balance update and the ledger append
/// commit together or not at all.
#[derive(Clone)]
pub struct PostgresWalletRepository {
    pool: PgPool,
}

impl PostgresWalletRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WalletRow {
    id: uuid::Uuid,
    client_id: uuid::Uuid,
    balance_cents: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            id: WalletId::from_uuid(row.id),
            client_id: ClientId::from_uuid(row.client_id),
            balance_cents: row.balance_cents,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    id: uuid::Uuid,
    wallet_id: uuid::Uuid,
    delta_cents: i64,
    balance_after: i64,
    reason: String,
    reference: Option<String>,
    metadata: Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<LedgerRow> for WalletLedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let reason = LedgerReason::from_str(row.reason.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored ledger reason '{}': {error}",
                row.reason
            ))
        })?;

        Ok(Self {
            id: LedgerEntryId::from_uuid(row.id),
            wallet_id: WalletId::from_uuid(row.wallet_id),
            delta_cents: row.delta_cents,
            balance_after: row.balance_after,
            reason,
            reference: row.reference,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl WalletRepository for PostgresWalletRepository {
    async fn ensure_wallet(&self, client_id: ClientId) -> AppResult<Wallet> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, client_id, balance_cents)
            VALUES ($1, $2, 0)
            ON CONFLICT (client_id) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(client_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to ensure wallet: {error}")))?;

        self.find_wallet(client_id).await?.ok_or_else(|| {
            AppError::Internal(format!("wallet for client '{client_id}' disappeared"))
        })
    }

    async fn find_wallet(&self, client_id: ClientId) -> AppResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, client_id, balance_cents, updated_at
            FROM wallets
            WHERE client_id = $1
            "#,
        )
        .bind(client_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find wallet: {error}")))?;

        Ok(row.map(Wallet::from))
    }

    async fn find_wallet_by_id(&self, wallet_id: WalletId) -> AppResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(
            r#"
            SELECT id, client_id, balance_cents, updated_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find wallet: {error}")))?;

        Ok(row.map(Wallet::from))
    }

    async fn apply_delta(
        &self,
        wallet_id: WalletId,
        delta_cents: i64,
        reason: LedgerReason,
        reference: Option<String>,
        metadata: Value,
    ) -> AppResult<WalletLedgerEntry> {
        if delta_cents == 0 {
            return Err(AppError::Validation(
                "ledger entries must carry a non-zero delta".to_owned(),
            ));
        }

        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT balance_cents
            FROM wallets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(wallet_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock wallet: {error}")))?
        .ok_or_else(|| AppError::NotFound(format!("wallet '{wallet_id}' was not found")))?;

        let new_balance = balance.checked_add(delta_cents).ok_or_else(|| {
            AppError::Validation(format!(
                "delta {delta_cents} overflows wallet '{wallet_id}'"
            ))
        })?;
        if new_balance < 0 {
            return Err(AppError::InsufficientFunds(format!(
                "wallet '{wallet_id}' balance {balance} cannot cover {delta_cents}"
            )));
        }

        sqlx::query(
            r#"
            UPDATE wallets
            SET balance_cents = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(wallet_id.as_uuid())
        .bind(new_balance)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update balance: {error}")))?;

        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            INSERT INTO wallet_ledger (id, wallet_id, delta_cents, balance_after, reason, reference, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, wallet_id, delta_cents, balance_after, reason, reference, metadata, created_at
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(wallet_id.as_uuid())
        .bind(delta_cents)
        .bind(new_balance)
        .bind(reason.as_str())
        .bind(reference)
        .bind(metadata)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append ledger entry: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        tracing::info!(
            wallet_id = %wallet_id,
            delta_cents,
            balance_after = new_balance,
            reason = reason.as_str(),
            "wallet balance changed"
        );

        WalletLedgerEntry::try_from(row)
    }

    async fn list_entries(&self, wallet_id: WalletId) -> AppResult<Vec<WalletLedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, wallet_id, delta_cents, balance_after, reason, reference, metadata, created_at
            FROM wallet_ledger
            WHERE wallet_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(wallet_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list ledger entries: {error}")))?;

        rows.into_iter().map(WalletLedgerEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use sqlx::PgPool;
    use sqlx::migrate::Migrator;
    use sqlx::postgres::PgPoolOptions;

    use tollbooth_application::WalletRepository;
    use tollbooth_core::{AppError, ClientId};
    use tollbooth_domain::LedgerReason;

    use super::PostgresWalletRepository;

    static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

    async fn test_pool() -> Option<PgPool> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        let pool = match PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url.as_str())
            .await
        {
            Ok(pool) => pool,
            Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
        };

        if let Err(error) = MIGRATOR.run(&pool).await {
            panic!("failed to run migrations for wallet tests: {error}");
        }

        Some(pool)
    }

    fn empty_metadata() -> Value {
        Value::Object(serde_json::Map::new())
    }

    #[tokio::test]
    async fn ensure_wallet_is_idempotent() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresWalletRepository::new(pool);
        let client_id = ClientId::new();

        let first = repository.ensure_wallet(client_id).await;
        let second = repository.ensure_wallet(client_id).await;

        assert!(first.is_ok());
        assert!(second.is_ok());
        if let (Ok(first), Ok(second)) = (first, second) {
            assert_eq!(first.id, second.id);
            assert_eq!(second.balance_cents, 0);
        }
    }

    #[tokio::test]
    async fn rejected_debits_leave_balance_and_ledger_untouched() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresWalletRepository::new(pool);
        let wallet = repository.ensure_wallet(ClientId::new()).await;
        assert!(wallet.is_ok());
        let Ok(wallet) = wallet else {
            return;
        };

        let topped_up = repository
            .apply_delta(wallet.id, 100, LedgerReason::TopUp, None, empty_metadata())
            .await;
        assert!(topped_up.is_ok());

        let overdraw = repository
            .apply_delta(wallet.id, -150, LedgerReason::Debit, None, empty_metadata())
            .await;
        assert!(matches!(overdraw, Err(AppError::InsufficientFunds(_))));

        let reloaded = repository.find_wallet_by_id(wallet.id).await;
        assert!(reloaded.is_ok());
        if let Ok(Some(reloaded)) = reloaded {
            assert_eq!(reloaded.balance_cents, 100);
        }

        let entries = repository.list_entries(wallet.id).await.unwrap_or_default();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].balance_after, 100);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresWalletRepository::new(pool);
        let wallet = repository.ensure_wallet(ClientId::new()).await;
        assert!(wallet.is_ok());
        let Ok(wallet) = wallet else {
            return;
        };

        let topped_up = repository
            .apply_delta(wallet.id, 100, LedgerReason::TopUp, None, empty_metadata())
            .await;
        assert!(topped_up.is_ok());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repository = repository.clone();
            let wallet_id = wallet.id;
            handles.push(tokio::spawn(async move {
                repository
                    .apply_delta(wallet_id, -60, LedgerReason::Debit, None, empty_metadata())
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if matches!(handle.await, Ok(Ok(_))) {
                succeeded += 1;
            }
        }

        // 100 cents covers exactly one 60-cent debit.
        assert_eq!(succeeded, 1);

        let reloaded = repository.find_wallet_by_id(wallet.id).await;
        assert!(reloaded.is_ok());
        if let Ok(Some(reloaded)) = reloaded {
            assert_eq!(reloaded.balance_cents, 40);
        }
    }
}
