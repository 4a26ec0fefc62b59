//! Role hierarchy, assignment, and audit types.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tollbooth_core::{AppError, AppResult, ClientId, UserId};

/// Unique identifier for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
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

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Maximum stored length for a permission code.
pub const PERMISSION_CODE_MAX_LENGTH: usize = 120;

/// A validated permission code such as `client.view`.
///
/// Codes are open-ended strings attached to roles; they are not a closed
/// set known at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionCode(String);

impl PermissionCode {
    /// Creates a validated permission code.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "permission code must not be empty".to_owned(),
            ));
        }

        if trimmed.len() > PERMISSION_CODE_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "permission code must not exceed {PERMISSION_CODE_MAX_LENGTH} characters"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the validated code string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<PermissionCode> for String {
    fn from(value: PermissionCode) -> Self {
        value.0
    }
}

impl Display for PermissionCode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A role in the hierarchy tree.
///
/// Each role has zero or one parent. A role's effective permission set is
/// the union of codes attached to itself and every ancestor up to the
/// root. The parent relation forms a forest; preventing cycles is a
/// creation-time responsibility of the surrounding system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier.
    pub id: RoleId,
    /// Unique human-readable name.
    pub name: String,
    /// Unique short slug used for lookups.
    pub code: String,
    /// Free-form description.
    pub description: String,
    /// Parent role edge, absent for roots.
    pub parent_id: Option<RoleId>,
}

/// Action recorded on a role assignment audit fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentAction {
    /// A role was assigned to a (user, client) pair.
    Assign,
    /// A role assignment was removed.
    Remove,
}

impl AssignmentAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Remove => "remove",
        }
    }
}

impl FromStr for AssignmentAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "assign" => Ok(Self::Assign),
            "remove" => Ok(Self::Remove),
            _ => Err(AppError::Validation(format!(
                "unknown assignment action '{value}'"
            ))),
        }
    }
}

/// The role a user holds within one client scope.
///
/// Unique per (user, client): a user has at most one role per client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRoleAssignment {
    /// User holding the role.
    pub user_id: UserId,
    /// Client scope of the grant.
    pub client_id: ClientId,
    /// Granted role.
    pub role_id: RoleId,
    /// When the assignment was first created.
    pub created_at: DateTime<Utc>,
}

/// Immutable audit fact describing one assignment mutation.
///
/// Always appended in the same transaction as the mutation it describes,
/// never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignmentAudit {
    /// Stable event identifier.
    pub id: Uuid,
    /// Acting user, absent for system-initiated mutations.
    pub actor: Option<UserId>,
    /// User whose assignment changed.
    pub target_user: UserId,
    /// Client scope of the assignment.
    pub client_id: ClientId,
    /// Role assigned or removed.
    pub role_id: Option<RoleId>,
    /// What happened.
    pub action: AssignmentAction,
    /// Free-form operator notes.
    pub notes: String,
    /// Event timestamp.
    pub created_at: DateTime<Utc>,
}
