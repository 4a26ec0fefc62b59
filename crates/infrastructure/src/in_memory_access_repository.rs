//! In-memory access control repository for tests and local development.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use tollbooth_application::{
    AssignRoleInput, AssignmentRepository, CreateRoleInput, RemoveRoleInput, RoleRepository,
};
use tollbooth_core::{AppError, AppResult, ClientId, UserId};
use tollbooth_domain::{
    AssignmentAction, ClientRoleAssignment, PermissionCode, Role, RoleAssignmentAudit, RoleId,
};

/// In-memory implementation of the role and assignment repository ports.
#[derive(Debug, Default)]
pub struct InMemoryAccessRepository {
    roles: RwLock<HashMap<RoleId, Role>>,
    permissions: RwLock<HashMap<RoleId, BTreeSet<PermissionCode>>>,
    assignments: RwLock<HashMap<(UserId, ClientId), ClientRoleAssignment>>,
    audit: RwLock<Vec<RoleAssignmentAudit>>,
}

impl InMemoryAccessRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for InMemoryAccessRepository {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let mut roles = self.roles.write().await;

        let name = input.name.trim().to_owned();
        let code = input.code.trim().to_owned();
        if roles
            .values()
            .any(|role| role.name == name || role.code == code)
        {
            return Err(AppError::Conflict(format!("role '{code}' already exists")));
        }

        let role = Role {
            id: RoleId::new(),
            name,
            code,
            description: input.description,
            parent_id: input.parent_id,
        };
        roles.insert(role.id, role.clone());

        Ok(role)
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.roles.read().await.get(&role_id).cloned())
    }

    async fn find_role_by_code(&self, code: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|role| role.code == code)
            .cloned())
    }

    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.read().await.values().cloned().collect();
        roles.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(roles)
    }

    async fn list_permission_codes(&self, role_id: RoleId) -> AppResult<Vec<PermissionCode>> {
        Ok(self
            .permissions
            .read()
            .await
            .get(&role_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn attach_permission(&self, role_id: RoleId, code: PermissionCode) -> AppResult<()> {
        self.permissions
            .write()
            .await
            .entry(role_id)
            .or_default()
            .insert(code);
        Ok(())
    }

    async fn detach_permission(&self, role_id: RoleId, code: &PermissionCode) -> AppResult<()> {
        if let Some(codes) = self.permissions.write().await.get_mut(&role_id) {
            codes.remove(code);
        }
        Ok(())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAccessRepository {
    async fn find_assignment(
        &self,
        user_id: UserId,
        client_id: ClientId,
    ) -> AppResult<Option<ClientRoleAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .get(&(user_id, client_id))
            .cloned())
    }

    async fn list_assignments_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<ClientRoleAssignment>> {
        let mut listed: Vec<ClientRoleAssignment> = self
            .assignments
            .read()
            .await
            .values()
            .filter(|assignment| assignment.user_id == user_id)
            .cloned()
            .collect();
        listed.sort_by_key(|assignment| assignment.client_id);
        Ok(listed)
    }

    async fn upsert_assignment(&self, input: AssignRoleInput) -> AppResult<ClientRoleAssignment> {
        // Both write locks are held across the change so the assignment
        // and its audit fact appear together.
        let mut assignments = self.assignments.write().await;
        let mut audit = self.audit.write().await;

        let assignment = assignments
            .entry((input.user_id, input.client_id))
            .and_modify(|existing| existing.role_id = input.role_id)
            .or_insert_with(|| ClientRoleAssignment {
                user_id: input.user_id,
                client_id: input.client_id,
                role_id: input.role_id,
                created_at: Utc::now(),
            })
            .clone();

        audit.push(RoleAssignmentAudit {
            id: Uuid::new_v4(),
            actor: input.actor,
            target_user: input.user_id,
            client_id: input.client_id,
            role_id: Some(input.role_id),
            action: AssignmentAction::Assign,
            notes: input.notes,
            created_at: Utc::now(),
        });

        Ok(assignment)
    }

    async fn remove_assignment(&self, input: RemoveRoleInput) -> AppResult<()> {
        let mut assignments = self.assignments.write().await;
        let mut audit = self.audit.write().await;

        let removed = assignments
            .remove(&(input.user_id, input.client_id))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no role assignment for user '{}' and client '{}'",
                    input.user_id, input.client_id
                ))
            })?;

        audit.push(RoleAssignmentAudit {
            id: Uuid::new_v4(),
            actor: input.actor,
            target_user: input.user_id,
            client_id: input.client_id,
            role_id: Some(removed.role_id),
            action: AssignmentAction::Remove,
            notes: input.notes,
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn list_audit_entries(
        &self,
        client_id: ClientId,
        limit: usize,
    ) -> AppResult<Vec<RoleAssignmentAudit>> {
        Ok(self
            .audit
            .read()
            .await
            .iter()
            .rev()
            .filter(|entry| entry.client_id == client_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
