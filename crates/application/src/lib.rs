//! Application services and ports.

#![forbid(unsafe_code)]

mod access_ports;
mod authorization_service;
mod role_admin_service;
mod subscription_service;
mod usage_service;
mod wallet_service;

pub use access_ports::{
    AssignRoleInput, AssignmentRepository, CreateRoleInput, RemoveRoleInput, RoleRepository,
};
pub use authorization_service::AuthorizationService;
pub use role_admin_service::RoleAdminService;
pub use subscription_service::{SubscriptionRepository, SubscriptionService};
pub use usage_service::{
    NewUsageRecord, RateCardRepository, RateCardSelector, RecordBlockedUsageInput,
    RecordUsageInput, USAGE_DEBIT_REFERENCE, UsageRecordRepository, UsageService,
};
pub use wallet_service::{WalletRepository, WalletService};
