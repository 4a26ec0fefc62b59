//! PostgreSQL-backed role hierarchy repository.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use tollbooth_application::{CreateRoleInput, RoleRepository};
use tollbooth_core::{AppError, AppResult};
use tollbooth_domain::{PermissionCode, Role, RoleId};

/// PostgreSQL implementation of the role repository port.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    name: String,
    code: String,
    description: String,
    parent_id: Option<uuid::Uuid>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: RoleId::from_uuid(row.id),
            name: row.name,
            code: row.code,
            description: row.description,
            parent_id: row.parent_id.map(RoleId::from_uuid),
        }
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let role_id = RoleId::new();

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, code, description, parent_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(input.name.trim())
        .bind(input.code.trim())
        .bind(input.description.as_str())
        .bind(input.parent_id.map(|parent_id| parent_id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| map_role_conflict(error, input.code.as_str()))?;

        Ok(Role {
            id: role_id,
            name: input.name.trim().to_owned(),
            code: input.code.trim().to_owned(),
            description: input.description,
            parent_id: input.parent_id,
        })
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, code, description, parent_id
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role: {error}")))?;

        Ok(row.map(Role::from))
    }

    async fn find_role_by_code(&self, code: &str) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, code, description, parent_id
            FROM roles
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role by code: {error}")))?;

        Ok(row.map(Role::from))
    }

    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, code, description, parent_id
            FROM roles
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn list_permission_codes(&self, role_id: RoleId) -> AppResult<Vec<PermissionCode>> {
        let values = sqlx::query_scalar::<_, String>(
            r#"
            SELECT permission_code
            FROM role_permissions
            WHERE role_id = $1
            ORDER BY permission_code
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?;

        values
            .into_iter()
            .map(|value| {
                PermissionCode::new(value.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored permission code '{value}' for role '{role_id}': {error}"
                    ))
                })
            })
            .collect()
    }

    async fn attach_permission(&self, role_id: RoleId, code: PermissionCode) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_code)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_code) DO NOTHING
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to attach permission: {error}")))?;

        Ok(())
    }

    async fn detach_permission(&self, role_id: RoleId, code: &PermissionCode) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM role_permissions
            WHERE role_id = $1 AND permission_code = $2
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to detach permission: {error}")))?;

        Ok(())
    }
}

fn map_role_conflict(error: sqlx::Error, code: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role '{code}' already exists"));
    }

    AppError::Internal(format!("failed to create role: {error}"))
}
