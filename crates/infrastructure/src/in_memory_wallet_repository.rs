//! In-memory wallet repository for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use tollbooth_application::WalletRepository;
use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{LedgerEntryId, LedgerReason, Wallet, WalletId, WalletLedgerEntry};

/// In-memory implementation of the wallet repository port.
///
/// The wallet map's write lock is held across the whole of `apply_delta`,
/// which gives the same serial-per-wallet guarantee the Postgres adapter
/// gets from its row lock.
#[derive(Debug, Default)]
pub struct InMemoryWalletRepository {
    wallets: RwLock<HashMap<WalletId, Wallet>>,
    entries: RwLock<HashMap<WalletId, Vec<WalletLedgerEntry>>>,
}

impl InMemoryWalletRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn ensure_wallet(&self, client_id: ClientId) -> AppResult<Wallet> {
        let mut wallets = self.wallets.write().await;

        if let Some(existing) = wallets.values().find(|wallet| wallet.client_id == client_id) {
            return Ok(existing.clone());
        }

        let wallet = Wallet {
            id: WalletId::new(),
            client_id,
            balance_cents: 0,
            updated_at: Utc::now(),
        };
        wallets.insert(wallet.id, wallet.clone());

        Ok(wallet)
    }

    async fn find_wallet(&self, client_id: ClientId) -> AppResult<Option<Wallet>> {
        Ok(self
            .wallets
            .read()
            .await
            .values()
            .find(|wallet| wallet.client_id == client_id)
            .cloned())
    }

    async fn find_wallet_by_id(&self, wallet_id: WalletId) -> AppResult<Option<Wallet>> {
        Ok(self.wallets.read().await.get(&wallet_id).cloned())
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

        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| AppError::NotFound(format!("wallet '{wallet_id}' was not found")))?;

        let new_balance = wallet.balance_cents.checked_add(delta_cents).ok_or_else(|| {
            AppError::Validation(format!(
                "delta {delta_cents} overflows wallet '{wallet_id}'"
            ))
        })?;
        if new_balance < 0 {
            return Err(AppError::InsufficientFunds(format!(
                "wallet '{wallet_id}' balance {} cannot cover {delta_cents}",
                wallet.balance_cents
            )));
        }

        wallet.balance_cents = new_balance;
        wallet.updated_at = Utc::now();

        let entry = WalletLedgerEntry {
            id: LedgerEntryId::new(),
            wallet_id,
            delta_cents,
            balance_after: new_balance,
            reason,
            reference,
            metadata,
            created_at: Utc::now(),
        };
        self.entries
            .write()
            .await
            .entry(wallet_id)
            .or_default()
            .push(entry.clone());

        Ok(entry)
    }

    async fn list_entries(&self, wallet_id: WalletId) -> AppResult<Vec<WalletLedgerEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&wallet_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use tollbooth_application::WalletRepository;
    use tollbooth_core::{AppError, ClientId};
    use tollbooth_domain::{LedgerReason, Wallet};

    use super::InMemoryWalletRepository;

    fn empty_metadata() -> Value {
        Value::Object(serde_json::Map::new())
    }

    async fn funded_wallet(repository: &InMemoryWalletRepository, cents: i64) -> Wallet {
        let wallet = match repository.ensure_wallet(ClientId::new()).await {
            Ok(wallet) => wallet,
            Err(error) => panic!("failed to provision test wallet: {error}"),
        };
        if cents > 0 {
            let topped_up = repository
                .apply_delta(wallet.id, cents, LedgerReason::TopUp, None, empty_metadata())
                .await;
            assert!(topped_up.is_ok());
        }
        wallet
    }

    #[tokio::test]
    async fn ensure_wallet_returns_the_same_wallet_twice() {
        let repository = InMemoryWalletRepository::new();
        let client_id = ClientId::new();

        let first = repository.ensure_wallet(client_id).await;
        let second = repository.ensure_wallet(client_id).await;

        assert!(first.is_ok());
        assert!(second.is_ok());
        if let (Ok(first), Ok(second)) = (first, second) {
            assert_eq!(first.id, second.id);
        }
    }

    #[tokio::test]
    async fn balance_always_reconciles_with_the_ledger() {
        let repository = InMemoryWalletRepository::new();
        let wallet = funded_wallet(&repository, 0).await;

        for delta in [500, -120, 300, -80, -600] {
            let reason = if delta > 0 {
                LedgerReason::TopUp
            } else {
                LedgerReason::Debit
            };
            let applied = repository
                .apply_delta(wallet.id, delta, reason, None, empty_metadata())
                .await;
            assert!(applied.is_ok());
        }

        let entries = repository.list_entries(wallet.id).await.unwrap_or_default();
        let total: i64 = entries.iter().map(|entry| entry.delta_cents).sum();

        let reloaded = repository.find_wallet_by_id(wallet.id).await;
        assert!(reloaded.is_ok());
        if let Ok(Some(reloaded)) = reloaded {
            assert_eq!(reloaded.balance_cents, total);
        }

        let mut running = 0;
        for entry in &entries {
            running += entry.delta_cents;
            assert_eq!(entry.balance_after, running);
        }
    }

    #[tokio::test]
    async fn rejected_overdraft_changes_nothing() {
        let repository = InMemoryWalletRepository::new();
        let wallet = funded_wallet(&repository, 100).await;

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
    }

    #[tokio::test]
    async fn zero_deltas_are_rejected() {
        let repository = InMemoryWalletRepository::new();
        let wallet = funded_wallet(&repository, 100).await;

        let result = repository
            .apply_delta(wallet.id, 0, LedgerReason::Debit, None, empty_metadata())
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let repository = Arc::new(InMemoryWalletRepository::new());
        let wallet = funded_wallet(&repository, 100).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
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
