//! Metered usage recording: pricing, wallet debit, and the usage log.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use tollbooth_core::{AppError, AppResult, ClientId, UserId};
use tollbooth_domain::{
    LedgerEntryId, RateCard, RateCardId, UsageRecord, UsageRecordId, UsageStatus, WalletId,
    validate_rating,
};

use crate::wallet_service::WalletService;

/// Ledger reference string written on every usage debit.
pub const USAGE_DEBIT_REFERENCE: &str = "llm_usage";

/// How a usage event names the rate card that prices it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateCardSelector {
    /// An explicit rate card, e.g. pinned on a prompt template.
    ById(RateCardId),
    /// Lookup by the (model, currency) pair the card is unique over.
    ByModel {
        /// Model lookup key.
        model: String,
        /// ISO currency code.
        currency: String,
    },
}

/// Input payload for recording a successful usage event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUsageInput {
    /// Wallet to charge.
    pub wallet_id: WalletId,
    /// Rate card selection.
    pub rate_card: RateCardSelector,
    /// Originating prompt template, when any.
    pub template_id: Option<Uuid>,
    /// Triggering user, when known.
    pub user_id: Option<UserId>,
    /// Client the event belongs to.
    pub client_id: ClientId,
    /// Rendered prompt text.
    pub prompt_text: String,
    /// Model response text.
    pub response_text: String,
    /// Input token count.
    pub tokens_in: u64,
    /// Output token count.
    pub tokens_out: u64,
    /// Free-form metadata stored on the record.
    pub metadata: Option<Value>,
}

/// Input payload for recording a usage event rejected before any model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBlockedUsageInput {
    /// Wallet the event would have charged.
    pub wallet_id: WalletId,
    /// Rate card selection.
    pub rate_card: RateCardSelector,
    /// Originating prompt template, when any.
    pub template_id: Option<Uuid>,
    /// Triggering user, when known.
    pub user_id: Option<UserId>,
    /// Client the event belongs to.
    pub client_id: ClientId,
    /// Rendered prompt text that was rejected.
    pub prompt_text: String,
    /// Why the event was blocked.
    pub blocked_reason: String,
    /// Free-form metadata stored on the record.
    pub metadata: Option<Value>,
}

/// New usage record handed to the repository for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageRecord {
    /// Wallet that was charged.
    pub wallet_id: WalletId,
    /// Rate card that priced the event.
    pub rate_card_id: RateCardId,
    /// Ledger entry for the debit, absent for zero-cost and blocked events.
    pub ledger_entry_id: Option<LedgerEntryId>,
    /// Originating prompt template, when any.
    pub template_id: Option<Uuid>,
    /// Triggering user, when known.
    pub user_id: Option<UserId>,
    /// Client the event belongs to.
    pub client_id: ClientId,
    /// Rendered prompt text.
    pub prompt_text: String,
    /// Model response text.
    pub response_text: String,
    /// Input token count.
    pub tokens_in: u64,
    /// Output token count.
    pub tokens_out: u64,
    /// Amount debited, in cents.
    pub cost_cents: i64,
    /// Outcome of the event.
    pub status: UsageStatus,
    /// Why the event was blocked, empty otherwise.
    pub blocked_reason: String,
    /// Free-form metadata.
    pub metadata: Value,
}

/// Repository port for rate card configuration.
#[async_trait]
pub trait RateCardRepository: Send + Sync {
    /// Persists a rate card. Fails with `Conflict` when one already exists
    /// for the (model, currency) pair.
    async fn create_rate_card(&self, rate_card: RateCard) -> AppResult<RateCard>;

    /// Finds a rate card by identifier.
    async fn find_rate_card(&self, rate_card_id: RateCardId) -> AppResult<Option<RateCard>>;

    /// Finds the rate card for a (model, currency) pair.
    async fn find_rate_card_for_model(
        &self,
        model: &str,
        currency: &str,
    ) -> AppResult<Option<RateCard>>;
}

/// Repository port for persisted usage records.
#[async_trait]
pub trait UsageRecordRepository: Send + Sync {
    /// Persists a new usage record.
    async fn insert_record(&self, record: NewUsageRecord) -> AppResult<UsageRecord>;

    /// Finds a usage record by identifier.
    async fn find_record(&self, record_id: UsageRecordId) -> AppResult<Option<UsageRecord>>;

    /// Updates only the rating and feedback fields of a record. Fails with
    /// `NotFound` for unknown records.
    async fn update_feedback(
        &self,
        record_id: UsageRecordId,
        rating: Option<i16>,
        feedback: String,
    ) -> AppResult<UsageRecord>;

    /// Lists a client's usage records, newest first.
    async fn list_records_for_client(&self, client_id: ClientId) -> AppResult<Vec<UsageRecord>>;
}

/// Application service orchestrating pricing, debit, and usage persistence.
///
/// The debit commits before the usage record is written. A crash between
/// the two can leave a paid debit without a record, never an unpaid
/// record; the `llm_usage` reference and the record's ledger-entry
/// back-reference keep the two stores reconcilable.
#[derive(Clone)]
pub struct UsageService {
    wallet_service: WalletService,
    rate_cards: Arc<dyn RateCardRepository>,
    usage_records: Arc<dyn UsageRecordRepository>,
}

impl UsageService {
    /// Creates a new usage service from its dependencies.
    #[must_use]
    pub fn new(
        wallet_service: WalletService,
        rate_cards: Arc<dyn RateCardRepository>,
        usage_records: Arc<dyn UsageRecordRepository>,
    ) -> Self {
        Self {
            wallet_service,
            rate_cards,
            usage_records,
        }
    }

    /// Creates and persists a validated rate card.
    pub async fn create_rate_card(
        &self,
        model: impl Into<String>,
        currency: impl Into<String>,
        input_cost_per_1k_cents: i64,
        output_cost_per_1k_cents: i64,
    ) -> AppResult<RateCard> {
        let rate_card = RateCard::new(
            model,
            currency,
            input_cost_per_1k_cents,
            output_cost_per_1k_cents,
        )?;

        self.rate_cards.create_rate_card(rate_card).await
    }

    /// Prices a usage event, debits the wallet, and persists the record.
    ///
    /// The record is created only if the debit succeeded, with `cost_cents`
    /// exactly equal to the debited amount and a reference to the debit's
    /// ledger entry. `InsufficientFunds` from the debit surfaces unchanged
    /// and leaves no usage record behind. A priced cost of zero skips the
    /// debit; the ledger never carries zero deltas.
    pub async fn record_usage(&self, input: RecordUsageInput) -> AppResult<UsageRecord> {
        let rate_card = self.resolve_rate_card(&input.rate_card).await?;
        let cost_cents = rate_card.cost_for_usage(input.tokens_in, input.tokens_out);

        let ledger_entry_id = if cost_cents > 0 {
            let entry = self
                .wallet_service
                .debit(
                    input.wallet_id,
                    cost_cents,
                    Some(USAGE_DEBIT_REFERENCE.to_owned()),
                    Some(json!({ "template_id": input.template_id })),
                )
                .await?;
            Some(entry.id)
        } else {
            None
        };

        self.usage_records
            .insert_record(NewUsageRecord {
                wallet_id: input.wallet_id,
                rate_card_id: rate_card.id,
                ledger_entry_id,
                template_id: input.template_id,
                user_id: input.user_id,
                client_id: input.client_id,
                prompt_text: input.prompt_text,
                response_text: input.response_text,
                tokens_in: input.tokens_in,
                tokens_out: input.tokens_out,
                cost_cents,
                status: UsageStatus::Success,
                blocked_reason: String::new(),
                metadata: input.metadata.unwrap_or_else(empty_metadata),
            })
            .await
    }

    /// Persists a blocked usage event: zero cost, no debit, no ledger
    /// reference, carrying the blocking reason.
    pub async fn record_blocked(&self, input: RecordBlockedUsageInput) -> AppResult<UsageRecord> {
        let rate_card = self.resolve_rate_card(&input.rate_card).await?;

        self.usage_records
            .insert_record(NewUsageRecord {
                wallet_id: input.wallet_id,
                rate_card_id: rate_card.id,
                ledger_entry_id: None,
                template_id: input.template_id,
                user_id: input.user_id,
                client_id: input.client_id,
                prompt_text: input.prompt_text,
                response_text: String::new(),
                tokens_in: 0,
                tokens_out: 0,
                cost_cents: 0,
                status: UsageStatus::Blocked,
                blocked_reason: input.blocked_reason,
                metadata: input.metadata.unwrap_or_else(empty_metadata),
            })
            .await
    }

    /// Attaches a user rating and feedback text to an existing record.
    ///
    /// The rating must be between 1 and 5 when present. Only the
    /// rating/feedback fields change; no re-billing happens.
    pub async fn attach_feedback(
        &self,
        record_id: UsageRecordId,
        rating: Option<i16>,
        feedback: impl Into<String>,
    ) -> AppResult<UsageRecord> {
        validate_rating(rating)?;

        self.usage_records
            .update_feedback(record_id, rating, feedback.into())
            .await
    }

    /// Finds a usage record by identifier.
    pub async fn find_record(&self, record_id: UsageRecordId) -> AppResult<Option<UsageRecord>> {
        self.usage_records.find_record(record_id).await
    }

    /// Lists a client's usage records, newest first.
    pub async fn list_records_for_client(
        &self,
        client_id: ClientId,
    ) -> AppResult<Vec<UsageRecord>> {
        self.usage_records.list_records_for_client(client_id).await
    }

    async fn resolve_rate_card(&self, selector: &RateCardSelector) -> AppResult<RateCard> {
        match selector {
            RateCardSelector::ById(rate_card_id) => self
                .rate_cards
                .find_rate_card(*rate_card_id)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "rate card '{rate_card_id}' is not configured"
                    ))
                }),
            RateCardSelector::ByModel { model, currency } => self
                .rate_cards
                .find_rate_card_for_model(model, currency)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "no rate card configured for model '{model}' in '{currency}'"
                    ))
                }),
        }
    }
}

fn empty_metadata() -> Value {
    Value::Object(serde_json::Map::new())
}
