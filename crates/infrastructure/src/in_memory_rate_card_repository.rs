//! In-memory rate card repository for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use tollbooth_application::RateCardRepository;
use tollbooth_core::{AppError, AppResult};
use tollbooth_domain::{RateCard, RateCardId};

/// In-memory implementation of the rate card repository port.
#[derive(Debug, Default)]
pub struct InMemoryRateCardRepository {
    cards: RwLock<HashMap<RateCardId, RateCard>>,
}

impl InMemoryRateCardRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCardRepository for InMemoryRateCardRepository {
    async fn create_rate_card(&self, rate_card: RateCard) -> AppResult<RateCard> {
        let mut cards = self.cards.write().await;

        if cards
            .values()
            .any(|card| card.model == rate_card.model && card.currency == rate_card.currency)
        {
            return Err(AppError::Conflict(format!(
                "rate card for model '{}' in '{}' already exists",
                rate_card.model, rate_card.currency
            )));
        }

        cards.insert(rate_card.id, rate_card.clone());
        Ok(rate_card)
    }

    async fn find_rate_card(&self, rate_card_id: RateCardId) -> AppResult<Option<RateCard>> {
        Ok(self.cards.read().await.get(&rate_card_id).cloned())
    }

    async fn find_rate_card_for_model(
        &self,
        model: &str,
        currency: &str,
    ) -> AppResult<Option<RateCard>> {
        Ok(self
            .cards
            .read()
            .await
            .values()
            .find(|card| card.model == model && card.currency == currency)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use tollbooth_application::RateCardRepository;
    use tollbooth_core::AppError;
    use tollbooth_domain::RateCard;

    use super::InMemoryRateCardRepository;

    fn card(model: &str, currency: &str) -> RateCard {
        match RateCard::new(model, currency, 100, 200) {
            Ok(card) => card,
            Err(error) => panic!("failed to build test rate card: {error}"),
        }
    }

    #[tokio::test]
    async fn one_card_per_model_and_currency() {
        let repository = InMemoryRateCardRepository::new();

        let first = repository.create_rate_card(card("gpt-4o", "USD")).await;
        assert!(first.is_ok());

        let duplicate = repository.create_rate_card(card("gpt-4o", "USD")).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let other_currency = repository.create_rate_card(card("gpt-4o", "EUR")).await;
        assert!(other_currency.is_ok());
    }

    #[tokio::test]
    async fn lookup_by_model_and_currency() {
        let repository = InMemoryRateCardRepository::new();
        let created = repository.create_rate_card(card("gpt-4o", "USD")).await;
        assert!(created.is_ok());

        let found = repository.find_rate_card_for_model("gpt-4o", "USD").await;
        assert!(matches!(found, Ok(Some(_))));

        let missing = repository.find_rate_card_for_model("gpt-4o", "EUR").await;
        assert!(matches!(missing, Ok(None)));
    }
}
