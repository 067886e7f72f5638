//! # Role Repository
//!
//! Roles, the permission catalog and the grants between them.
//!
//! ```text
//!   roles ──< role_permissions >── permissions (21 canonical tokens)
//!     ▲
//!     └── workers.role_id
//! ```
//!
//! Grants have set semantics: granting twice or revoking an absent token is
//! a no-op and writes no audit entry. When a session changes the grants of
//! its own role, its permission set is reloaded before returning.

use sqlx::{SqliteExecutor, SqlitePool};
use tracing::{debug, info};

use bodega_core::inputs::RoleInput;
use bodega_core::{
    AuditAction, CoreError, Permission, PermissionChecker, PermissionSet, PermissionToken, Role,
    Session,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};

/// Loads the permission set granted to a role.
pub(crate) async fn permission_set_of<'e, E>(executor: E, role_id: i64) -> DbResult<PermissionSet>
where
    E: SqliteExecutor<'e>,
{
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT p.name
        FROM permissions p
        JOIN role_permissions rp ON rp.permission_id = p.id
        WHERE rp.role_id = ?1
        "#,
    )
    .bind(role_id)
    .fetch_all(executor)
    .await?;

    Ok(PermissionSet::from_names(names))
}

#[derive(Debug, Clone)]
pub struct RoleRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl RoleRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        RoleRepository { pool, ctx }
    }

    // =========================================================================
    // Permission catalog
    // =========================================================================

    /// Inserts the canonical tokens that are missing. Returns how many
    /// were added; running it again adds none.
    pub async fn seed_permissions(&self) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;

        for token in PermissionToken::ALL {
            added += sqlx::query(
                "INSERT OR IGNORE INTO permissions (name, module, description) VALUES (?1, ?2, ?3)",
            )
            .bind(token.as_str())
            .bind(token.module())
            .bind(token.description())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;

        if added > 0 {
            info!(added, "Permission catalog seeded");
        }
        Ok(added)
    }

    pub async fn list_permissions(&self, session: &Session) -> DbResult<Vec<Permission>> {
        session.require_permission(PermissionToken::UsuariosVer)?;

        let perms = sqlx::query_as::<_, Permission>(
            "SELECT id, name, module, description FROM permissions ORDER BY module, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(perms)
    }

    /// Permissions granted to a role, by name.
    pub async fn permissions_for_role(
        &self,
        session: &Session,
        role_id: i64,
    ) -> DbResult<Vec<Permission>> {
        session.require_permission(PermissionToken::UsuariosVer)?;
        self.get_role(role_id).await?;

        let perms = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.name, p.module, p.description
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = ?1
            ORDER BY p.name
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(perms)
    }

    /// Token set of a role, for session loading.
    pub async fn permission_set(&self, role_id: i64) -> DbResult<PermissionSet> {
        permission_set_of(&self.pool, role_id).await
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub async fn get_role(&self, role_id: i64) -> DbResult<Role> {
        sqlx::query_as::<_, Role>(
            "SELECT id, name, description, level, active FROM roles WHERE id = ?1",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Role", role_id))
    }

    pub async fn list_roles(&self, session: &Session) -> DbResult<Vec<Role>> {
        session.require_permission(PermissionToken::UsuariosVer)?;

        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, level, active FROM roles ORDER BY level DESC, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    /// Creates a role. Names are unique ignoring case.
    pub async fn create_role(&self, session: &Session, input: RoleInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::UsuariosAsignarRoles)?;
        let input = input.validate()?;

        let id = sqlx::query(
            "INSERT INTO roles (name, description, level, active) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.level)
        .bind(input.active)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_key("Role", input.name.clone()))?
        .last_insert_rowid();

        info!(role_id = id, name = %input.name, "Role created");

        let role = Role {
            id,
            name: input.name,
            description: input.description,
            level: input.level,
            active: input.active,
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "roles", id)
                    .by(session)
                    .after(&role),
            )
            .await;

        Ok(id)
    }

    pub async fn update_role(
        &self,
        session: &Session,
        role_id: i64,
        input: RoleInput,
    ) -> DbResult<Role> {
        session.require_permission(PermissionToken::UsuariosAsignarRoles)?;
        let input = input.validate()?;
        let before = self.get_role(role_id).await?;

        sqlx::query(
            r#"
            UPDATE roles SET name = ?2, description = ?3, level = ?4, active = ?5
            WHERE id = ?1
            "#,
        )
        .bind(role_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.level)
        .bind(input.active)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_key("Role", input.name.clone()))?;

        let after = Role {
            id: role_id,
            name: input.name,
            description: input.description,
            level: input.level,
            active: input.active,
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "roles", role_id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// Deletes a role nobody references.
    ///
    /// ## Errors
    /// - `STATE_FORBIDDEN` while any worker, active or not, holds the role
    pub async fn delete_role(&self, session: &Session, role_id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::UsuariosAsignarRoles)?;
        let before = self.get_role(role_id).await?;

        let mut tx = self.pool.begin().await?;

        let (active, inactive): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(active = 1), 0), COALESCE(SUM(active = 0), 0)
            FROM workers
            WHERE role_id = ?1
            "#,
        )
        .bind(role_id)
        .fetch_one(&mut *tx)
        .await?;

        if active > 0 {
            return Err(CoreError::forbidden("Role", role_id, "assigned to active workers").into());
        }
        if inactive > 0 {
            return Err(
                CoreError::forbidden("Role", role_id, "assigned to inactive workers").into(),
            );
        }

        sqlx::query("DELETE FROM roles WHERE id = ?1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(role_id, "Role deleted");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Delete, "roles", role_id)
                    .by(session)
                    .before(&before),
            )
            .await;

        Ok(())
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Grants a token to a role. Returns `false` when it was already granted.
    pub async fn grant_permission(
        &self,
        session: &mut Session,
        role_id: i64,
        token: PermissionToken,
    ) -> DbResult<bool> {
        session.require_permission(PermissionToken::UsuariosAsignarRoles)?;
        self.get_role(role_id).await?;
        let permission_id = self.permission_id(token).await?;

        let changed = sqlx::query(
            "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?1, ?2)",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        self.after_grant_change(session, role_id, token, changed, "granted").await?;
        Ok(changed)
    }

    /// Revokes a token from a role. Returns `false` when it was not granted.
    pub async fn revoke_permission(
        &self,
        session: &mut Session,
        role_id: i64,
        token: PermissionToken,
    ) -> DbResult<bool> {
        session.require_permission(PermissionToken::UsuariosAsignarRoles)?;
        self.get_role(role_id).await?;
        let permission_id = self.permission_id(token).await?;

        let changed = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = ?1 AND permission_id = ?2",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?
        .rows_affected()
        > 0;

        self.after_grant_change(session, role_id, token, changed, "revoked").await?;
        Ok(changed)
    }

    async fn permission_id(&self, token: PermissionToken) -> DbResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM permissions WHERE name = ?1")
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Permission", token.as_str()))
    }

    async fn after_grant_change(
        &self,
        session: &mut Session,
        role_id: i64,
        token: PermissionToken,
        changed: bool,
        verb: &str,
    ) -> DbResult<()> {
        if !changed {
            debug!(role_id, token = %token, "Grant unchanged");
            return Ok(());
        }

        info!(role_id, token = %token, verb, "Role permissions changed");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "role_permissions", role_id)
                    .by(session)
                    .after(&serde_json::json!({ "change": verb, "permission": token.as_str() })),
            )
            .await;

        if session.role_id == role_id {
            let perms = self.permission_set(role_id).await?;
            session.replace_permissions(role_id, perms);
        }
        Ok(())
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}
