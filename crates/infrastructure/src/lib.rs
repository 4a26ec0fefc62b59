//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod database;
mod in_memory_access_repository;
mod in_memory_rate_card_repository;
mod in_memory_subscription_repository;
mod in_memory_usage_record_repository;
mod in_memory_wallet_repository;
mod postgres_assignment_repository;
mod postgres_rate_card_repository;
mod postgres_role_repository;
mod postgres_subscription_repository;
mod postgres_usage_record_repository;
mod postgres_wallet_repository;

pub use database::connect_and_migrate;
pub use in_memory_access_repository::InMemoryAccessRepository;
pub use in_memory_rate_card_repository::InMemoryRateCardRepository;
pub use in_memory_subscription_repository::InMemorySubscriptionRepository;
pub use in_memory_usage_record_repository::InMemoryUsageRecordRepository;
pub use in_memory_wallet_repository::InMemoryWalletRepository;
pub use postgres_assignment_repository::PostgresAssignmentRepository;
pub use postgres_rate_card_repository::PostgresRateCardRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use postgres_subscription_repository::PostgresSubscriptionRepository;
pub use postgres_usage_record_repository::PostgresUsageRecordRepository;
pub use postgres_wallet_repository::PostgresWalletRepository;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tollbooth_application::{
        AssignRoleInput, AssignmentRepository, AuthorizationService, CreateRoleInput,
        RateCardSelector, RecordUsageInput, RoleRepository, UsageService, WalletService,
    };
    use tollbooth_core::{AppError, ClientId, UserId};
    use tollbooth_domain::PermissionCode;

    use super::{
        InMemoryAccessRepository, InMemoryRateCardRepository, InMemoryUsageRecordRepository,
        InMemoryWalletRepository,
    };

    #[tokio::test]
    async fn metering_flow_debits_the_wallet_and_links_the_record() {
        let wallets = Arc::new(InMemoryWalletRepository::new());
        let wallet_service = WalletService::new(wallets);
        let usage_service = UsageService::new(
            wallet_service.clone(),
            Arc::new(InMemoryRateCardRepository::new()),
            Arc::new(InMemoryUsageRecordRepository::new()),
        );

        let client_id = ClientId::new();
        let wallet = wallet_service.ensure_wallet(client_id).await;
        assert!(wallet.is_ok());
        let Ok(wallet) = wallet else {
            return;
        };

        let topped_up = wallet_service.top_up(wallet.id, 1000, None, None).await;
        assert!(topped_up.is_ok());

        let rate_card = usage_service.create_rate_card("gpt-4o", "USD", 100, 200).await;
        assert!(rate_card.is_ok());
        let Ok(rate_card) = rate_card else {
            return;
        };

        let record = usage_service
            .record_usage(RecordUsageInput {
                wallet_id: wallet.id,
                rate_card: RateCardSelector::ById(rate_card.id),
                template_id: None,
                user_id: Some(UserId::new()),
                client_id,
                prompt_text: "Summarize the quarterly report".to_owned(),
                response_text: "The quarter closed up 4%".to_owned(),
                tokens_in: 1500,
                tokens_out: 500,
                metadata: None,
            })
            .await;
        assert!(record.is_ok());
        let Ok(record) = record else {
            return;
        };
        assert_eq!(record.cost_cents, 250);

        let balance = wallet_service.balance(wallet.id).await;
        assert!(matches!(balance, Ok(750)));

        // The record's ledger reference points at the debit that paid it.
        let entries = wallet_service.entries(wallet.id).await.unwrap_or_default();
        assert_eq!(entries.len(), 2);
        assert_eq!(record.ledger_entry_id, Some(entries[1].id));
        assert_eq!(entries[1].delta_cents, -250);
    }

    #[tokio::test]
    async fn permission_checks_walk_the_role_hierarchy() {
        let access = Arc::new(InMemoryAccessRepository::new());
        let roles: Arc<dyn RoleRepository> = access.clone();
        let assignments: Arc<dyn AssignmentRepository> = access.clone();
        let authorization = AuthorizationService::new(roles, assignments);

        let parent = access
            .create_role(CreateRoleInput {
                name: "Manager".to_owned(),
                code: "manager".to_owned(),
                description: String::new(),
                parent_id: None,
            })
            .await;
        assert!(parent.is_ok());
        let Ok(parent) = parent else {
            return;
        };

        let child = access
            .create_role(CreateRoleInput {
                name: "Analyst".to_owned(),
                code: "analyst".to_owned(),
                description: String::new(),
                parent_id: Some(parent.id),
            })
            .await;
        assert!(child.is_ok());
        let Ok(child) = child else {
            return;
        };

        let code = PermissionCode::new("reports.approve")
            .unwrap_or_else(|_| unreachable!("code is valid"));
        let attached = access.attach_permission(parent.id, code.clone()).await;
        assert!(attached.is_ok());

        let user_id = UserId::new();
        let client_id = ClientId::new();
        let assigned = access
            .upsert_assignment(AssignRoleInput {
                actor: None,
                user_id,
                client_id,
                role_id: child.id,
                notes: String::new(),
            })
            .await;
        assert!(assigned.is_ok());

        let inherited = authorization.has_permission(user_id, client_id, &code).await;
        assert!(matches!(inherited, Ok(true)));

        // Detaching from the ancestor takes effect on the next check.
        let detached = access.detach_permission(parent.id, &code).await;
        assert!(detached.is_ok());
        let after_detach = authorization.has_permission(user_id, client_id, &code).await;
        assert!(matches!(after_detach, Ok(false)));

        let reattached = access.attach_permission(parent.id, code.clone()).await;
        assert!(reattached.is_ok());

        let elsewhere = authorization
            .has_permission(user_id, ClientId::new(), &code)
            .await;
        assert!(matches!(elsewhere, Ok(false)));

        let required = authorization
            .require_permission(user_id, ClientId::new(), &code)
            .await;
        assert!(matches!(required, Err(AppError::Forbidden(_))));
    }
}
