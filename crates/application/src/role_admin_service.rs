//! Role administration: role creation, permission grants, and the audited
//! assignment write path.

use std::sync::Arc;

use tollbooth_core::{AppError, AppResult, ClientId, NonEmptyString, UserId};
use tollbooth_domain::{ClientRoleAssignment, PermissionCode, Role, RoleAssignmentAudit, RoleId};

use crate::access_ports::{
    AssignRoleInput, AssignmentRepository, CreateRoleInput, RemoveRoleInput, RoleRepository,
};

/// Application service for administering roles and assignments.
#[derive(Clone)]
pub struct RoleAdminService {
    roles: Arc<dyn RoleRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl RoleAdminService {
    /// Creates a new service from repository implementations.
    #[must_use]
    pub fn new(roles: Arc<dyn RoleRepository>, assignments: Arc<dyn AssignmentRepository>) -> Self {
        Self { roles, assignments }
    }

    /// Creates a role, validating its names and that any parent exists.
    pub async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        NonEmptyString::new(input.name.as_str())
            .map_err(|_| AppError::Validation("role name must not be empty".to_owned()))?;
        NonEmptyString::new(input.code.as_str())
            .map_err(|_| AppError::Validation("role code must not be empty".to_owned()))?;

        if let Some(parent_id) = input.parent_id
            && self.roles.find_role(parent_id).await?.is_none()
        {
            return Err(AppError::NotFound(format!(
                "parent role '{parent_id}' was not found"
            )));
        }

        self.roles.create_role(input).await
    }

    /// Returns all roles ordered by name.
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.roles.list_roles().await
    }

    /// Attaches a permission code to an existing role.
    pub async fn attach_permission(&self, role_id: RoleId, code: PermissionCode) -> AppResult<()> {
        self.require_role(role_id).await?;
        self.roles.attach_permission(role_id, code).await
    }

    /// Detaches a permission code from an existing role.
    ///
    /// Takes effect on the next permission check; effective sets are never
    /// cached on assignments.
    pub async fn detach_permission(
        &self,
        role_id: RoleId,
        code: &PermissionCode,
    ) -> AppResult<()> {
        self.require_role(role_id).await?;
        self.roles.detach_permission(role_id, code).await
    }

    /// Sets or replaces the role a user holds within a client scope.
    ///
    /// The assignment upsert and its `assign` audit fact commit in one
    /// transaction. Re-assigning the same role still appends a fresh audit
    /// fact; each call is a distinct event.
    pub async fn assign_role(
        &self,
        actor: Option<UserId>,
        user_id: UserId,
        client_id: ClientId,
        role_id: RoleId,
        notes: impl Into<String>,
    ) -> AppResult<ClientRoleAssignment> {
        self.require_role(role_id).await?;

        self.assignments
            .upsert_assignment(AssignRoleInput {
                actor,
                user_id,
                client_id,
                role_id,
                notes: notes.into(),
            })
            .await
    }

    /// Removes the role a user holds within a client scope.
    ///
    /// Fails with `NotFound` when no assignment exists; otherwise the
    /// `remove` audit fact captures the role before the row is deleted,
    /// in the same transaction.
    pub async fn remove_role(
        &self,
        actor: Option<UserId>,
        user_id: UserId,
        client_id: ClientId,
        notes: impl Into<String>,
    ) -> AppResult<()> {
        self.assignments
            .remove_assignment(RemoveRoleInput {
                actor,
                user_id,
                client_id,
                notes: notes.into(),
            })
            .await
    }

    /// Returns the most recent audit facts for a client, newest first.
    pub async fn list_audit_entries(
        &self,
        client_id: ClientId,
        limit: usize,
    ) -> AppResult<Vec<RoleAssignmentAudit>> {
        self.assignments.list_audit_entries(client_id, limit).await
    }

    async fn require_role(&self, role_id: RoleId) -> AppResult<()> {
        if self.roles.find_role(role_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "role '{role_id}' was not found"
            )));
        }

        Ok(())
    }
}
