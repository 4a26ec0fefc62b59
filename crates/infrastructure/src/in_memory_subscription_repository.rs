//! In-memory subscription repository for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tollbooth_application::SubscriptionRepository;
use tollbooth_core::{AppError, AppResult, ClientId};
use tollbooth_domain::{Subscription, SubscriptionId, SubscriptionStatus};

/// In-memory implementation of the subscription repository port.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert_subscription(&self, subscription: Subscription) -> AppResult<Subscription> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn find_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .get(&subscription_id)
            .cloned())
    }

    async fn mark_active(
        &self,
        subscription_id: SubscriptionId,
        current_period_end: Option<DateTime<Utc>>,
    ) -> AppResult<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions.get_mut(&subscription_id).ok_or_else(|| {
            AppError::NotFound(format!("subscription '{subscription_id}' was not found"))
        })?;

        subscription.status = SubscriptionStatus::Active;
        subscription.current_period_end = current_period_end;
        subscription.updated_at = Utc::now();
        Ok(subscription.clone())
    }

    async fn cancel(&self, subscription_id: SubscriptionId) -> AppResult<Subscription> {
        let mut subscriptions = self.subscriptions.write().await;
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
        let mut listed: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|subscription| subscription.client_id == client_id)
            .cloned()
            .collect();
        listed.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(listed)
    }
}
