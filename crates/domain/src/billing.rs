//! Wallet, ledger, rate card, and subscription types.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use tollbooth_core::{AppError, AppResult, ClientId};

/// Unique identifier for a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(Uuid);

impl WalletId {
    /// Creates a random wallet identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a wallet identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WalletId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for a wallet ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntryId(Uuid);

impl LedgerEntryId {
    /// Creates a random ledger entry identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ledger entry identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LedgerEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LedgerEntryId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Prepaid balance held for one client, in minor currency units.
///
/// One wallet exists per client and its balance never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Stable wallet identifier.
    pub id: WalletId,
    /// Owning client (1:1).
    pub client_id: ClientId,
    /// Current balance in cents.
    pub balance_cents: i64,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Balance increased by a payment or credit.
    TopUp,
    /// Balance decreased by a usage charge.
    Debit,
}

impl LedgerReason {
    /// Returns a stable storage value for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::Debit => "debit",
        }
    }
}

impl FromStr for LedgerReason {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "top_up" => Ok(Self::TopUp),
            "debit" => Ok(Self::Debit),
            _ => Err(AppError::Validation(format!(
                "unknown ledger reason '{value}'"
            ))),
        }
    }
}

/// Immutable record of one balance change.
///
/// `balance_after` equals the wallet balance immediately after applying
/// `delta_cents`; replaying a wallet's entries in creation order from zero
/// reconstructs the current balance exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLedgerEntry {
    /// Stable entry identifier.
    pub id: LedgerEntryId,
    /// Wallet this entry belongs to.
    pub wallet_id: WalletId,
    /// Signed balance change, never zero.
    pub delta_cents: i64,
    /// Balance after applying the delta.
    pub balance_after: i64,
    /// Why the balance changed.
    pub reason: LedgerReason,
    /// Optional caller-supplied reference such as an invoice id.
    pub reference: Option<String>,
    /// Free-form metadata.
    pub metadata: Value,
    /// Entry timestamp.
    pub created_at: DateTime<Utc>,
}

/// Unique identifier for a rate card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateCardId(Uuid);

impl RateCardId {
    /// Creates a random rate card identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a rate card identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RateCardId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RateCardId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Pricing configuration converting token usage into cost.
///
/// Unique per (model, currency). Rates are integer cents per 1000 tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    /// Stable rate card identifier.
    pub id: RateCardId,
    /// Model lookup key this card prices.
    pub model: String,
    /// ISO currency code, e.g. `USD`.
    pub currency: String,
    /// Cents charged per 1000 input tokens.
    pub input_cost_per_1k_cents: i64,
    /// Cents charged per 1000 output tokens.
    pub output_cost_per_1k_cents: i64,
}

impl RateCard {
    /// Creates a validated rate card.
    pub fn new(
        model: impl Into<String>,
        currency: impl Into<String>,
        input_cost_per_1k_cents: i64,
        output_cost_per_1k_cents: i64,
    ) -> AppResult<Self> {
        let model = model.into();
        let currency = currency.into();

        if model.trim().is_empty() {
            return Err(AppError::Validation(
                "rate card model must not be empty".to_owned(),
            ));
        }

        if currency.trim().is_empty() {
            return Err(AppError::Validation(
                "rate card currency must not be empty".to_owned(),
            ));
        }

        if input_cost_per_1k_cents < 0 || output_cost_per_1k_cents < 0 {
            return Err(AppError::Validation(
                "rate card costs must not be negative".to_owned(),
            ));
        }

        Ok(Self {
            id: RateCardId::new(),
            model,
            currency,
            input_cost_per_1k_cents,
            output_cost_per_1k_cents,
        })
    }

    /// Returns the total cost in cents for the given token usage.
    ///
    /// Computes `round_half_up((tokens_in * input_rate + tokens_out *
    /// output_rate) / 1000)` with exact integer arithmetic, rounding the
    /// combined value once rather than each term separately.
    #[must_use]
    pub fn cost_for_usage(&self, tokens_in: u64, tokens_out: u64) -> i64 {
        let input_rate = u128::try_from(self.input_cost_per_1k_cents.max(0)).unwrap_or(0);
        let output_rate = u128::try_from(self.output_cost_per_1k_cents.max(0)).unwrap_or(0);

        let numerator =
            u128::from(tokens_in) * input_rate + u128::from(tokens_out) * output_rate;
        let cost = (numerator + 500) / 1000;

        i64::try_from(cost).unwrap_or(i64::MAX)
    }
}

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Creates a random subscription identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a subscription identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle status of a client subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created but not yet confirmed by the payment provider.
    Incomplete,
    /// Confirmed and billable.
    Active,
    /// Terminated.
    Canceled,
}

impl SubscriptionStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Active => "active",
            Self::Canceled => "canceled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "incomplete" => Ok(Self::Incomplete),
            "active" => Ok(Self::Active),
            "canceled" => Ok(Self::Canceled),
            _ => Err(AppError::Validation(format!(
                "unknown subscription status '{value}'"
            ))),
        }
    }
}

/// A client subscription driven by an external payment-webhook collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Stable subscription identifier.
    pub id: SubscriptionId,
    /// Owning client.
    pub client_id: ClientId,
    /// Payment provider customer reference.
    pub provider_customer_id: String,
    /// Payment provider subscription reference.
    pub provider_subscription_id: String,
    /// Current lifecycle status.
    pub status: SubscriptionStatus,
    /// End of the paid period, when known.
    pub current_period_end: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{LedgerReason, RateCard, SubscriptionStatus};

    fn card(input_rate: i64, output_rate: i64) -> RateCard {
        RateCard {
            id: super::RateCardId::new(),
            model: "gpt-4o".to_owned(),
            currency: "USD".to_owned(),
            input_cost_per_1k_cents: input_rate,
            output_cost_per_1k_cents: output_rate,
        }
    }

    #[test]
    fn cost_for_exact_thousand_input_tokens() {
        assert_eq!(card(100, 200).cost_for_usage(1000, 0), 100);
    }

    #[test]
    fn cost_rounds_combined_value_once() {
        // 1500 in @ 100 => 150, 500 out @ 200 => 100, combined 250.
        assert_eq!(card(100, 200).cost_for_usage(1500, 500), 250);
    }

    #[test]
    fn cost_rounds_half_up() {
        // 5 tokens @ 100 per 1k is exactly 0.5 cents.
        assert_eq!(card(100, 0).cost_for_usage(5, 0), 1);
        // 4 tokens @ 100 per 1k is 0.4 cents.
        assert_eq!(card(100, 0).cost_for_usage(4, 0), 0);
    }

    #[test]
    fn cost_does_not_round_terms_separately() {
        // 0.25 + 0.25 cents must combine to 0.5 and round up to 1, not
        // round each term to 0.
        assert_eq!(card(100, 100).cost_for_usage(2500, 2500), 500);
        assert_eq!(card(1, 1).cost_for_usage(250, 250), 1);
    }

    #[test]
    fn cost_for_zero_usage_is_zero() {
        assert_eq!(card(100, 200).cost_for_usage(0, 0), 0);
    }

    #[test]
    fn rate_card_rejects_negative_rates() {
        assert!(RateCard::new("gpt-4o", "USD", -1, 0).is_err());
    }

    #[test]
    fn rate_card_rejects_blank_model() {
        assert!(RateCard::new("  ", "USD", 1, 1).is_err());
    }

    #[test]
    fn ledger_reason_roundtrip_storage_value() {
        let reason = LedgerReason::TopUp;
        let restored = LedgerReason::from_str(reason.as_str());
        assert!(restored.is_ok());
        assert_eq!(restored.unwrap_or(LedgerReason::Debit), reason);
    }

    #[test]
    fn subscription_status_roundtrip_storage_value() {
        for status in [
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
        ] {
            let restored = SubscriptionStatus::from_str(status.as_str());
            assert_eq!(restored.unwrap_or(SubscriptionStatus::Incomplete), status);
        }
    }

    #[test]
    fn unknown_subscription_status_is_rejected() {
        assert!(SubscriptionStatus::from_str("paused").is_err());
    }
}
