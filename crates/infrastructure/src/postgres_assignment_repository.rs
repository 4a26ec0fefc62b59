//! PostgreSQL-backed assignment repository with a same-transaction audit
//! trail.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use tollbooth_application::{AssignRoleInput, AssignmentRepository, RemoveRoleInput};
use tollbooth_core::{AppError, AppResult, ClientId, UserId};
use tollbooth_domain::{AssignmentAction, ClientRoleAssignment, RoleAssignmentAudit, RoleId};

/// PostgreSQL implementation of the assignment repository port.
///
/// Every mutation writes its audit fact inside the same transaction as
/// the assignment change.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    pool: PgPool,
}

impl PostgresAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    user_id: uuid::Uuid,
    client_id: uuid::Uuid,
    role_id: uuid::Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<AssignmentRow> for ClientRoleAssignment {
    fn from(row: AssignmentRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.user_id),
            client_id: ClientId::from_uuid(row.client_id),
            role_id: RoleId::from_uuid(row.role_id),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: uuid::Uuid,
    actor: Option<uuid::Uuid>,
    target_user: uuid::Uuid,
    client_id: uuid::Uuid,
    role_id: Option<uuid::Uuid>,
    action: String,
    notes: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<AuditRow> for RoleAssignmentAudit {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = AssignmentAction::from_str(row.action.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored audit action '{}': {error}",
                row.action
            ))
        })?;

        Ok(Self {
            id: row.id,
            actor: row.actor.map(UserId::from_uuid),
            target_user: UserId::from_uuid(row.target_user),
            client_id: ClientId::from_uuid(row.client_id),
            role_id: row.role_id.map(RoleId::from_uuid),
            action,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn find_assignment(
        &self,
        user_id: UserId,
        client_id: ClientId,
    ) -> AppResult<Option<ClientRoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, client_id, role_id, created_at
            FROM role_assignments
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(client_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find assignment: {error}")))?;

        Ok(row.map(ClientRoleAssignment::from))
    }

    async fn list_assignments_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<ClientRoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, client_id, role_id, created_at
            FROM role_assignments
            WHERE user_id = $1
            ORDER BY client_id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list assignments: {error}")))?;

        Ok(rows.into_iter().map(ClientRoleAssignment::from).collect())
    }

    async fn upsert_assignment(&self, input: AssignRoleInput) -> AppResult<ClientRoleAssignment> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            INSERT INTO role_assignments (user_id, client_id, role_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, client_id) DO UPDATE
            SET role_id = EXCLUDED.role_id
            RETURNING user_id, client_id, role_id, created_at
            "#,
        )
        .bind(input.user_id.as_uuid())
        .bind(input.client_id.as_uuid())
        .bind(input.role_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to upsert assignment: {error}")))?;

        append_audit(
            &mut transaction,
            input.actor,
            input.user_id,
            input.client_id,
            Some(input.role_id),
            AssignmentAction::Assign,
            input.notes.as_str(),
        )
        .await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        tracing::info!(
            user_id = %input.user_id,
            client_id = %input.client_id,
            role_id = %input.role_id,
            "role assigned"
        );

        Ok(ClientRoleAssignment::from(row))
    }

    async fn remove_assignment(&self, input: RemoveRoleInput) -> AppResult<()> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        // Capture the role before deleting so the audit fact records what
        // the user lost.
        let role_id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT role_id
            FROM role_assignments
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(input.user_id.as_uuid())
        .bind(input.client_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve assignment: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "no role assignment for user '{}' and client '{}'",
                input.user_id, input.client_id
            ))
        })?;

        sqlx::query(
            r#"
            DELETE FROM role_assignments
            WHERE user_id = $1 AND client_id = $2
            "#,
        )
        .bind(input.user_id.as_uuid())
        .bind(input.client_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to remove assignment: {error}")))?;

        append_audit(
            &mut transaction,
            input.actor,
            input.user_id,
            input.client_id,
            Some(RoleId::from_uuid(role_id)),
            AssignmentAction::Remove,
            input.notes.as_str(),
        )
        .await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        tracing::info!(
            user_id = %input.user_id,
            client_id = %input.client_id,
            "role assignment removed"
        );

        Ok(())
    }

    async fn list_audit_entries(
        &self,
        client_id: ClientId,
        limit: usize,
    ) -> AppResult<Vec<RoleAssignmentAudit>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor, target_user, client_id, role_id, action, notes, created_at
            FROM role_assignment_audit
            WHERE client_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(client_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit entries: {error}")))?;

        rows.into_iter().map(RoleAssignmentAudit::try_from).collect()
    }
}

async fn append_audit(
    transaction: &mut Transaction<'_, Postgres>,
    actor: Option<UserId>,
    target_user: UserId,
    client_id: ClientId,
    role_id: Option<RoleId>,
    action: AssignmentAction,
    notes: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO role_assignment_audit (id, actor, target_user, client_id, role_id, action, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(actor.map(|actor| actor.as_uuid()))
    .bind(target_user.as_uuid())
    .bind(client_id.as_uuid())
    .bind(role_id.map(|role_id| role_id.as_uuid()))
    .bind(action.as_str())
    .bind(notes)
    .execute(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to append audit entry: {error}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use sqlx::migrate::Migrator;
    use sqlx::postgres::PgPoolOptions;

    use tollbooth_application::{
        AssignRoleInput, AssignmentRepository, CreateRoleInput, RemoveRoleInput, RoleRepository,
    };
    use tollbooth_core::{AppError, ClientId, UserId};
    use tollbooth_domain::AssignmentAction;

    use crate::postgres_role_repository::PostgresRoleRepository;

    use super::PostgresAssignmentRepository;

    static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

    async fn test_pool() -> Option<PgPool> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        let pool = match PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url.as_str())
            .await
        {
            Ok(pool) => pool,
            Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
        };

        if let Err(error) = MIGRATOR.run(&pool).await {
            panic!("failed to run migrations for assignment tests: {error}");
        }

        Some(pool)
    }

    async fn create_role(pool: &PgPool, name: &str, code: &str) -> tollbooth_domain::Role {
        let roles = PostgresRoleRepository::new(pool.clone());
        let created = roles
            .create_role(CreateRoleInput {
                name: name.to_owned(),
                code: code.to_owned(),
                description: String::new(),
                parent_id: None,
            })
            .await;
        match created {
            Ok(role) => role,
            Err(error) => panic!("failed to create test role: {error}"),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_the_role_and_appends_audit_facts() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresAssignmentRepository::new(pool.clone());
        let user_id = UserId::new();
        let client_id = ClientId::new();
        let suffix = uuid::Uuid::new_v4();
        let viewer = create_role(&pool, &format!("Viewer {suffix}"), &format!("viewer-{suffix}")).await;
        let editor = create_role(&pool, &format!("Editor {suffix}"), &format!("editor-{suffix}")).await;

        let first = repository
            .upsert_assignment(AssignRoleInput {
                actor: None,
                user_id,
                client_id,
                role_id: viewer.id,
                notes: String::new(),
            })
            .await;
        assert!(first.is_ok());

        let second = repository
            .upsert_assignment(AssignRoleInput {
                actor: None,
                user_id,
                client_id,
                role_id: editor.id,
                notes: "promotion".to_owned(),
            })
            .await;
        assert!(second.is_ok());
        if let Ok(assignment) = second {
            assert_eq!(assignment.role_id, editor.id);
        }

        let assignments = repository
            .list_assignments_for_user(user_id)
            .await
            .unwrap_or_default();
        assert_eq!(assignments.len(), 1);

        let audit = repository
            .list_audit_entries(client_id, 10)
            .await
            .unwrap_or_default();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].role_id, Some(editor.id));
        assert_eq!(audit[0].notes, "promotion");
    }

    #[tokio::test]
    async fn remove_captures_the_role_before_deletion() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresAssignmentRepository::new(pool.clone());
        let user_id = UserId::new();
        let client_id = ClientId::new();
        let suffix = uuid::Uuid::new_v4();
        let role = create_role(&pool, &format!("Admin {suffix}"), &format!("admin-{suffix}")).await;

        let assigned = repository
            .upsert_assignment(AssignRoleInput {
                actor: None,
                user_id,
                client_id,
                role_id: role.id,
                notes: String::new(),
            })
            .await;
        assert!(assigned.is_ok());

        let removed = repository
            .remove_assignment(RemoveRoleInput {
                actor: None,
                user_id,
                client_id,
                notes: "offboarding".to_owned(),
            })
            .await;
        assert!(removed.is_ok());

        let assignment = repository.find_assignment(user_id, client_id).await;
        assert!(matches!(assignment, Ok(None)));

        let audit = repository
            .list_audit_entries(client_id, 10)
            .await
            .unwrap_or_default();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0].action, AssignmentAction::Remove);
        assert_eq!(audit[0].role_id, Some(role.id));
    }

    #[tokio::test]
    async fn removing_a_missing_assignment_is_not_found() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresAssignmentRepository::new(pool);
        let result = repository
            .remove_assignment(RemoveRoleInput {
                actor: None,
                user_id: UserId::new(),
                client_id: ClientId::new(),
                notes: String::new(),
            })
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
