//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod billing;
mod usage;

pub use access::{
    AssignmentAction, ClientRoleAssignment, PERMISSION_CODE_MAX_LENGTH, PermissionCode, Role,
    RoleAssignmentAudit, RoleId,
};
pub use billing::{
    LedgerEntryId, LedgerReason, RateCard, RateCardId, Subscription, SubscriptionId,
    SubscriptionStatus, Wallet, WalletId, WalletLedgerEntry,
};
pub use usage::{
    RATING_MAX, RATING_MIN, UsageRecord, UsageRecordId, UsageStatus, validate_rating,
};
