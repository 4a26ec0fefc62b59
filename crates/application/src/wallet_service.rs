//! Prepaid wallet ledger operations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{LedgerReason, Wallet, WalletId, WalletLedgerEntry};

/// Repository port for wallet balances and their append-only ledger.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Provisions the wallet for a client if it does not exist yet.
    /// Idempotent; returns the existing wallet otherwise.
    async fn ensure_wallet(&self, client_id: ClientId) -> AppResult<Wallet>;

    /// Finds the wallet owned by a client.
    async fn find_wallet(&self, client_id: ClientId) -> AppResult<Option<Wallet>>;

    /// Finds a wallet by identifier.
    async fn find_wallet_by_id(&self, wallet_id: WalletId) -> AppResult<Option<Wallet>>;

    /// Applies a signed, non-zero balance change and appends the matching
    /// ledger entry, as one atomic unit under an exclusive per-wallet lock.
    ///
    /// Fails with `InsufficientFunds` when the new balance would be
    /// negative and `NotFound` for unknown wallets; either way nothing is
    /// written. Concurrent calls against the same wallet observe a strict
    /// serial order; unrelated wallets proceed independently.
    async fn apply_delta(
        &self,
        wallet_id: WalletId,
        delta_cents: i64,
        reason: LedgerReason,
        reference: Option<String>,
        metadata: Value,
    ) -> AppResult<WalletLedgerEntry>;

    /// Lists a wallet's ledger entries in creation order.
    async fn list_entries(&self, wallet_id: WalletId) -> AppResult<Vec<WalletLedgerEntry>>;
}

/// Application service for wallet provisioning, top-ups, and debits.
#[derive(Clone)]
pub struct WalletService {
    repository: Arc<dyn WalletRepository>,
}

impl WalletService {
    /// Creates a new wallet service from a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn WalletRepository>) -> Self {
        Self { repository }
    }

    /// Provisions the wallet for a client. Idempotent; intended to be
    /// called explicitly from the client-creation workflow.
    pub async fn ensure_wallet(&self, client_id: ClientId) -> AppResult<Wallet> {
        self.repository.ensure_wallet(client_id).await
    }

    /// Finds the wallet owned by a client.
    pub async fn wallet_for_client(&self, client_id: ClientId) -> AppResult<Option<Wallet>> {
        self.repository.find_wallet(client_id).await
    }

    /// Credits a wallet. The amount must be positive; invalid amounts are
    /// rejected before any lock is taken.
    pub async fn top_up(
        &self,
        wallet_id: WalletId,
        amount_cents: i64,
        reference: Option<String>,
        metadata: Option<Value>,
    ) -> AppResult<WalletLedgerEntry> {
        if amount_cents <= 0 {
            return Err(AppError::Validation(
                "top up amount must be positive".to_owned(),
            ));
        }

        self.repository
            .apply_delta(
                wallet_id,
                amount_cents,
                LedgerReason::TopUp,
                reference,
                metadata.unwrap_or_else(empty_metadata),
            )
            .await
    }

    /// Debits a wallet. The amount must be positive; invalid amounts are
    /// rejected before any lock is taken. Fails with `InsufficientFunds`
    /// when the balance cannot cover the amount; callers must not retry
    /// that rejection automatically.
    pub async fn debit(
        &self,
        wallet_id: WalletId,
        amount_cents: i64,
        reference: Option<String>,
        metadata: Option<Value>,
    ) -> AppResult<WalletLedgerEntry> {
        if amount_cents <= 0 {
            return Err(AppError::Validation(
                "debit amount must be positive".to_owned(),
            ));
        }

        self.repository
            .apply_delta(
                wallet_id,
                -amount_cents,
                LedgerReason::Debit,
                reference,
                metadata.unwrap_or_else(empty_metadata),
            )
            .await
    }

    /// Returns a wallet's current balance in cents.
    pub async fn balance(&self, wallet_id: WalletId) -> AppResult<i64> {
        let wallet = self
            .repository
            .find_wallet_by_id(wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wallet '{wallet_id}' was not found")))?;

        Ok(wallet.balance_cents)
    }

    /// Lists a wallet's ledger entries in creation order.
    pub async fn entries(&self, wallet_id: WalletId) -> AppResult<Vec<WalletLedgerEntry>> {
        self.repository.list_entries(wallet_id).await
    }
}

fn empty_metadata() -> Value {
    Value::Object(serde_json::Map::new())
}
