//! Repository ports for roles, assignments, and the assignment audit log.

use async_trait::async_trait;

use tollbooth_core::{AppResult, ClientId, UserId};
use tollbooth_domain::{ClientRoleAssignment, PermissionCode, Role, RoleAssignmentAudit, RoleId};

/// Input payload for creating a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique human-readable role name.
    pub name: String,
    /// Unique short slug.
    pub code: String,
    /// Free-form description.
    pub description: String,
    /// Parent role, absent for roots.
    pub parent_id: Option<RoleId>,
}

/// Input payload for assigning a role to a (user, client) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRoleInput {
    /// Acting user, absent for system-initiated assignments.
    pub actor: Option<UserId>,
    /// User receiving the role.
    pub user_id: UserId,
    /// Client scope of the grant.
    pub client_id: ClientId,
    /// Role to grant.
    pub role_id: RoleId,
    /// Free-form operator notes copied onto the audit fact.
    pub notes: String,
}

/// Input payload for removing a (user, client) role assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRoleInput {
    /// Acting user, absent for system-initiated removals.
    pub actor: Option<UserId>,
    /// User losing the role.
    pub user_id: UserId,
    /// Client scope of the assignment.
    pub client_id: ClientId,
    /// Free-form operator notes copied onto the audit fact.
    pub notes: String,
}

/// Repository port for the role hierarchy and attached permission codes.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Creates a role. Fails with `Conflict` when the name or code is taken.
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role>;

    /// Finds a role by identifier.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds a role by its unique slug.
    async fn find_role_by_code(&self, code: &str) -> AppResult<Option<Role>>;

    /// Lists all roles ordered by name.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Lists permission codes attached directly to a role, ancestors excluded.
    async fn list_permission_codes(&self, role_id: RoleId) -> AppResult<Vec<PermissionCode>>;

    /// Attaches a permission code to a role. Idempotent.
    async fn attach_permission(&self, role_id: RoleId, code: PermissionCode) -> AppResult<()>;

    /// Detaches a permission code from a role.
    async fn detach_permission(&self, role_id: RoleId, code: &PermissionCode) -> AppResult<()>;
}

/// Repository port for role assignments and their audit trail.
///
/// Mutations append their audit fact in the same transaction as the
/// assignment change; an aborted write leaves neither behind.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Finds the unique assignment for a (user, client) pair.
    async fn find_assignment(
        &self,
        user_id: UserId,
        client_id: ClientId,
    ) -> AppResult<Option<ClientRoleAssignment>>;

    /// Lists a user's assignments across all clients, ordered by client.
    async fn list_assignments_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<ClientRoleAssignment>>;

    /// Sets or replaces the role for a (user, client) pair and appends an
    /// `assign` audit fact. Re-assigning an identical role leaves the row
    /// unchanged but still appends a fresh audit fact.
    async fn upsert_assignment(&self, input: AssignRoleInput) -> AppResult<ClientRoleAssignment>;

    /// Deletes the assignment for a (user, client) pair, appending a
    /// `remove` audit fact that captures the role before deletion. Fails
    /// with `NotFound` when no assignment exists.
    async fn remove_assignment(&self, input: RemoveRoleInput) -> AppResult<()>;

    /// Lists the most recent audit facts for a client, newest first.
    async fn list_audit_entries(
        &self,
        client_id: ClientId,
        limit: usize,
    ) -> AppResult<Vec<RoleAssignmentAudit>>;
}
