//! Usage record types and feedback validation.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use tollbooth_core::{AppError, AppResult, ClientId, UserId};

use crate::billing::{LedgerEntryId, RateCardId, WalletId};

/// Unique identifier for a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageRecordId(Uuid);

impl UsageRecordId {
    /// Creates a random usage record identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a usage record identifier from an existing UUID value.
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

impl Default for UsageRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UsageRecordId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Outcome of one usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// Priced, debited, and recorded.
    Success,
    /// Rejected before any model call was made.
    Blocked,
    /// The model call failed.
    Error,
}

impl UsageStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }
}

impl FromStr for UsageStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "blocked" => Ok(Self::Blocked),
            "error" => Ok(Self::Error),
            _ => Err(AppError::Validation(format!(
                "unknown usage status '{value}'"
            ))),
        }
    }
}

/// One metered usage event and its billing outcome.
///
/// Created only after the debit that pays for it succeeded; `cost_cents`
/// always equals the debited amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Stable record identifier.
    pub id: UsageRecordId,
    /// Wallet that was charged.
    pub wallet_id: WalletId,
    /// Rate card that priced the event.
    pub rate_card_id: RateCardId,
    /// Ledger entry for the debit, absent for zero-cost and blocked events.
    pub ledger_entry_id: Option<LedgerEntryId>,
    /// Originating prompt template, when any.
    pub template_id: Option<Uuid>,
    /// User who triggered the event, when known.
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
    /// Amount debited for this event, in cents.
    pub cost_cents: i64,
    /// Outcome of the event.
    pub status: UsageStatus,
    /// Why the event was blocked, empty otherwise.
    pub blocked_reason: String,
    /// User rating between 1 and 5, when given.
    pub rating: Option<i16>,
    /// Free-form user feedback.
    pub feedback: String,
    /// Free-form metadata.
    pub metadata: Value,
    /// Record timestamp.
    pub created_at: DateTime<Utc>,
}

/// Lowest accepted feedback rating.
pub const RATING_MIN: i16 = 1;

/// Highest accepted feedback rating.
pub const RATING_MAX: i16 = 5;

/// Validates a feedback rating; `None` means no rating was given.
pub fn validate_rating(rating: Option<i16>) -> AppResult<()> {
    if let Some(value) = rating
        && !(RATING_MIN..=RATING_MAX).contains(&value)
    {
        return Err(AppError::Validation(format!(
            "rating must be between {RATING_MIN} and {RATING_MAX}, got {value}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{UsageStatus, validate_rating};

    #[test]
    fn rating_bounds_are_inclusive() {
        assert!(validate_rating(Some(1)).is_ok());
        assert!(validate_rating(Some(5)).is_ok());
        assert!(validate_rating(None).is_ok());
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        assert!(validate_rating(Some(0)).is_err());
        assert!(validate_rating(Some(6)).is_err());
        assert!(validate_rating(Some(-3)).is_err());
    }

    #[test]
    fn usage_status_roundtrip_storage_value() {
        for status in [UsageStatus::Success, UsageStatus::Blocked, UsageStatus::Error] {
            let restored = UsageStatus::from_str(status.as_str());
            assert_eq!(restored.unwrap_or(UsageStatus::Error), status);
        }
    }
}
