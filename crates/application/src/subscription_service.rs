//! Billing-provider subscription lifecycle tracking.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{Subscription, SubscriptionId, SubscriptionStatus};

/// Repository port for persisted subscriptions.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Persists a new subscription.
    async fn insert_subscription(&self, subscription: Subscription) -> AppResult<Subscription>;

    /// Finds a subscription by identifier.
    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<Subscription>>;

    /// Marks a subscription active and stores the new period end. Fails
    /// with `NotFound` for unknown subscriptions.
    async fn mark_active(
        &self,
        subscription_id: SubscriptionId,
        current_period_end: Option<DateTime<Utc>>,
    ) -> AppResult<Subscription>;

    /// Marks a subscription canceled. Fails with `NotFound` for unknown
    /// subscriptions.
    async fn cancel(&self, subscription_id: SubscriptionId) -> AppResult<Subscription>;

    /// Lists a client's subscriptions, newest first.
    async fn list_subscriptions_for_client(
        &self,
        client_id: ClientId,
    ) -> AppResult<Vec<Subscription>>;
}

/// Application service tracking the external billing provider's view of a
/// client's subscription.
#[derive(Clone)]
pub struct SubscriptionService {
    repository: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionService {
    /// Creates a new subscription service from its repository.
    #[must_use]
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    /// Records a subscription created at the billing provider. New
    /// subscriptions start in the incomplete state until the provider
    /// confirms payment.
    pub async fn create_subscription(
        &self,
        client_id: ClientId,
        provider_customer_id: impl Into<String>,
        provider_subscription_id: impl Into<String>,
    ) -> AppResult<Subscription> {
        let provider_customer_id = provider_customer_id.into();
        if provider_customer_id.trim().is_empty() {
            return Err(AppError::Validation(
                "provider customer id must not be blank".to_owned(),
            ));
        }

        let now = Utc::now();
        self.repository
            .insert_subscription(Subscription {
                id: SubscriptionId::new(),
                client_id,
                provider_customer_id,
                provider_subscription_id: provider_subscription_id.into(),
                status: SubscriptionStatus::Incomplete,
                current_period_end: None,
                created_at: now,
                updated_at: now,
            })
            .await
    }

    /// Marks a subscription active, recording the period end the provider
    /// reported.
    pub async fn mark_active(
        &self,
        subscription_id: SubscriptionId,
        current_period_end: Option<DateTime<Utc>>,
    ) -> AppResult<Subscription> {
        self.repository
            .mark_active(subscription_id, current_period_end)
            .await
    }

    /// Marks a subscription canceled.
    pub async fn cancel(&self, subscription_id: SubscriptionId) -> AppResult<Subscription> {
        self.repository.cancel(subscription_id).await
    }

    /// Finds a subscription by identifier.
    pub async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<Subscription>> {
        self.repository.find_subscription(subscription_id).await
    }

    /// Lists a client's subscriptions, newest first.
    pub async fn list_subscriptions_for_client(
        &self,
        client_id: ClientId,
    ) -> AppResult<Vec<Subscription>> {
        self.repository.list_subscriptions_for_client(client_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use tokio::sync::Mutex;

    use tollbooth_core::{AppError, AppResult, ClientId};
    use tollbooth_domain::{Subscription, SubscriptionId, SubscriptionStatus};

    use super::{SubscriptionRepository, SubscriptionService};

    #[derive(Default)]
    struct FakeSubscriptionRepository {
        subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    }

    #[async_trait]
    impl SubscriptionRepository for FakeSubscriptionRepository {
        async fn insert_subscription(
            &self,
            subscription: Subscription,
        ) -> AppResult<Subscription> {
            self.subscriptions
                .lock()
                .await
                .insert(subscription.id, subscription.clone());
            Ok(subscription)
        }

        async fn find_subscription(
            &self,
            subscription_id: SubscriptionId,
        ) -> AppResult<Option<Subscription>> {
            Ok(self.subscriptions.lock().await.get(&subscription_id).cloned())
        }

        async fn mark_active(
            &self,
            subscription_id: SubscriptionId,
            current_period_end: Option<DateTime<Utc>>,
        ) -> AppResult<Subscription> {
            let mut subscriptions = self.subscriptions.lock().await;
            let subscription = subscriptions.get_mut(&subscription_id).ok_or_else(|| {
                AppError::NotFound(format!("subscription '{subscription_id}' was not found"))
            })?;
            subscription.status = SubscriptionStatus::Active;
            subscription.current_period_end = current_period_end;
            subscription.updated_at = Utc::now();
            Ok(subscription.clone())
        }

        async fn cancel(&self, subscription_id: SubscriptionId) -> AppResult<Subscription> {
            let mut subscriptions = self.subscriptions.lock().await;
            let subscription = subscriptions.get_mut(&subscription_id).ok_or_else(|| {
                AppError::NotFound(format!("subscription '{subscription_id}' was not found"))
            })?;
            subscription.status = SubscriptionStatus::Canceled;
            subscription.updated_at = Utc::now();
            Ok(subscription.clone())
        }

        async fn list_subscriptions_for_client(
            &self,
            client_id: ClientId,
        ) -> AppResult<Vec<Subscription>> {
            Ok(self
                .subscriptions
                .lock()
                .await
                .values()
                .filter(|subscription| subscription.client_id == client_id)
                .cloned()
                .collect())
        }
    }

    fn service() -> SubscriptionService {
        SubscriptionService::new(Arc::new(FakeSubscriptionRepository::default()))
    }

    #[tokio::test]
    async fn new_subscriptions_start_incomplete() {
        let service = service();

        let subscription = service
            .create_subscription(ClientId::new(), "cus_123", "sub_456")
            .await;

        assert!(subscription.is_ok());
        if let Ok(subscription) = subscription {
            assert_eq!(subscription.status, SubscriptionStatus::Incomplete);
            assert!(subscription.current_period_end.is_none());
        }
    }

    #[tokio::test]
    async fn blank_provider_customer_id_is_rejected() {
        let service = service();

        let result = service
            .create_subscription(ClientId::new(), "  ", "sub_456")
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn activation_records_the_period_end() {
        let service = service();
        let created = service
            .create_subscription(ClientId::new(), "cus_123", "sub_456")
            .await;
        assert!(created.is_ok());
        let Ok(created) = created else {
            return;
        };

        let period_end = Utc::now() + Duration::days(30);
        let activated = service.mark_active(created.id, Some(period_end)).await;

        assert!(activated.is_ok());
        if let Ok(activated) = activated {
            assert_eq!(activated.status, SubscriptionStatus::Active);
            assert_eq!(activated.current_period_end, Some(period_end));
        }
    }

    #[tokio::test]
    async fn cancellation_keeps_the_period_end() {
        let service = service();
        let created = service
            .create_subscription(ClientId::new(), "cus_123", "sub_456")
            .await;
        assert!(created.is_ok());
        let Ok(created) = created else {
            return;
        };

        let period_end = Utc::now() + Duration::days(30);
        let activated = service.mark_active(created.id, Some(period_end)).await;
        assert!(activated.is_ok());

        let canceled = service.cancel(created.id).await;
        assert!(canceled.is_ok());
        if let Ok(canceled) = canceled {
            assert_eq!(canceled.status, SubscriptionStatus::Canceled);
            assert_eq!(canceled.current_period_end, Some(period_end));
        }
    }

    #[tokio::test]
    async fn lifecycle_changes_on_unknown_subscriptions_are_not_found() {
        let service = service();

        let activated = service.mark_active(SubscriptionId::new(), None).await;
        assert!(matches!(activated, Err(AppError::NotFound(_))));

        let canceled = service.cancel(SubscriptionId::new()).await;
        assert!(matches!(canceled, Err(AppError::NotFound(_))));
    }
}
