//! Permission resolution over the role hierarchy.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tollbooth_core::{AppError, AppResult, ClientId, UserId};
use tollbooth_domain::{PermissionCode, RoleId};

use crate::access_ports::{AssignmentRepository, RoleRepository};

/// Application service answering permission checks for (user, client) pairs.
///
/// The effective permission set is recomputed from the repositories on
/// every call; nothing is cached on assignments, so detaching a code from
/// an ancestor role takes effect on the next check.
#[derive(Clone)]
pub struct AuthorizationService {
    roles: Arc<dyn RoleRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl AuthorizationService {
    /// Creates a new authorization service from repository implementations.
    #[must_use]
    pub fn new(roles: Arc<dyn RoleRepository>, assignments: Arc<dyn AssignmentRepository>) -> Self {
        Self { roles, assignments }
    }

    /// Returns whether the user holds the permission within the client scope.
    ///
    /// Resolves the unique (user, client) assignment; a user with roles in
    /// other clients sees nothing from them here. Without an assignment the
    /// answer is `false`.
    pub async fn has_permission(
        &self,
        user_id: UserId,
        client_id: ClientId,
        code: &PermissionCode,
    ) -> AppResult<bool> {
        let Some(assignment) = self.assignments.find_assignment(user_id, client_id).await? else {
            return Ok(false);
        };

        let codes = self.collect_codes(assignment.role_id).await?;
        Ok(codes.contains(code))
    }

    /// Ensures the user holds the permission within the client scope.
    pub async fn require_permission(
        &self,
        user_id: UserId,
        client_id: ClientId,
        code: &PermissionCode,
    ) -> AppResult<()> {
        if self.has_permission(user_id, client_id, code).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing permission '{code}' in client '{client_id}'"
        )))
    }

    /// Returns the union of permission codes attached to a role and every
    /// ancestor up to the root.
    ///
    /// Fails with `NotFound` when the starting role does not exist.
    pub async fn effective_permission_codes(
        &self,
        role_id: RoleId,
    ) -> AppResult<BTreeSet<PermissionCode>> {
        if self.roles.find_role(role_id).await?.is_none() {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        self.collect_codes(role_id).await
    }

    /// Walks parent pointers from `role_id` to the root, unioning each
    /// visited role's codes. A missing role ends the walk, as does a role
    /// id seen before, so corrupt cyclic parent data cannot loop forever.
    async fn collect_codes(&self, role_id: RoleId) -> AppResult<BTreeSet<PermissionCode>> {
        let mut codes = BTreeSet::new();
        let mut visited: HashSet<RoleId> = HashSet::new();
        let mut cursor = Some(role_id);

        while let Some(current_id) = cursor {
            if !visited.insert(current_id) {
                break;
            }

            let Some(role) = self.roles.find_role(current_id).await? else {
                break;
            };

            codes.extend(self.roles.list_permission_codes(role.id).await?);
            cursor = role.parent_id;
        }

        Ok(codes)
    }
}
