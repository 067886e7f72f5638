//! # Worker Repository
//!
//! System users, their profile and their role assignment.
//!
//! ## Capability Seam
//! ```text
//!   AuthService ──uses──► dyn WorkerLookup ◄──implements── WorkerRepository
//!        │                                                      │
//!        └───────────── RoleRepository (permission sets) ◄──────┘
//! ```
//! The auth service only needs to find a worker and store a new hash, so it
//! depends on [`WorkerLookup`] instead of the full repository.
//!
//! Username and email are unique ignoring case; their case is preserved.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use bodega_core::inputs::WorkerInput;
use bodega_core::validation::validate_password;
use bodega_core::{
    AuditAction, CoreError, PermissionChecker, PermissionToken, Session, Worker,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::auth::{check_password, hash_password, PasswordMatch};
use crate::repository::role::permission_set_of;
use crate::repository::row_exists;

const WORKER_SELECT: &str = r#"
    SELECT id, name, surname, sex, birth_date, doc_type, doc_number, phone, address,
           username, email, password_hash, role_id, active, created_at
    FROM workers
"#;

/// What the authentication service needs from the worker store.
#[async_trait]
pub trait WorkerLookup: Send + Sync {
    /// Exact (case-sensitive) match on username or email.
    async fn find_by_login(&self, login: &str) -> DbResult<Option<Worker>>;

    async fn find_by_id(&self, worker_id: i64) -> DbResult<Option<Worker>>;

    async fn update_password_hash(&self, worker_id: i64, hash: &str) -> DbResult<()>;
}

#[derive(Serialize)]
struct RoleChange {
    role_id: i64,
}

#[derive(Debug, Clone)]
pub struct WorkerRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl WorkerRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        WorkerRepository { pool, ctx }
    }

    async fn fetch(&self, worker_id: i64) -> DbResult<Worker> {
        self.find_by_id(worker_id)
            .await?
            .ok_or_else(|| DbError::not_found("Worker", worker_id))
    }

    /// Reports the exact key that is already taken, ignoring `exclude_id`.
    async fn ensure_unique(&self, input: &WorkerInput, exclude_id: i64) -> DbResult<()> {
        let checks = [
            (
                "SELECT EXISTS(SELECT 1 FROM workers WHERE username = ?1 COLLATE NOCASE AND id != ?2)",
                input.username.as_str(),
                "username",
            ),
            (
                "SELECT EXISTS(SELECT 1 FROM workers WHERE email = ?1 COLLATE NOCASE AND id != ?2)",
                input.email.as_str(),
                "email",
            ),
        ];

        for (sql, value, field) in checks {
            let taken: bool = sqlx::query_scalar(sql)
                .bind(value)
                .bind(exclude_id)
                .fetch_one(&self.pool)
                .await?;
            if taken {
                return Err(CoreError::Duplicate {
                    entity: "Worker".to_string(),
                    key: format!("{} {}", field, value),
                }
                .into());
            }
        }

        let doc_taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM workers WHERE doc_type = ?1 AND doc_number = ?2 AND id != ?3)",
        )
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        if doc_taken {
            return Err(CoreError::Duplicate {
                entity: "Worker".to_string(),
                key: format!("document {}", input.doc_number),
            }
            .into());
        }

        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Creates a worker with an initial role and password.
    ///
    /// ## Errors
    /// - `PERMISSION_DENIED` without `usuarios_crear`
    /// - `INVALID_ARGUMENT` for any field contract, including the password policy
    /// - `NOT_FOUND` for an unknown role
    /// - `CONFLICT` naming the username, email or document already in use
    pub async fn create_worker(
        &self,
        session: &Session,
        input: WorkerInput,
        role_id: i64,
        password: &str,
    ) -> DbResult<i64> {
        session.require_permission(PermissionToken::UsuariosCrear)?;
        let input = input.validate()?;
        validate_password(password)?;

        if !row_exists(&self.pool, "roles", role_id).await? {
            return Err(DbError::not_found("Role", role_id));
        }
        self.ensure_unique(&input, 0).await?;

        let password_hash = hash_password(password)?;
        let created_at = self.ctx.now();

        debug!(username = %input.username, role_id, "Creating worker");

        let id = sqlx::query(
            r#"
            INSERT INTO workers (
                name, surname, sex, birth_date, doc_type, doc_number, phone, address,
                username, email, password_hash, role_id, active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13)
            "#,
        )
        .bind(&input.name)
        .bind(&input.surname)
        .bind(input.sex)
        .bind(input.birth_date)
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&password_hash)
        .bind(role_id)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_key("Worker", input.username.clone()))?
        .last_insert_rowid();

        info!(worker_id = id, username = %input.username, "Worker created");

        let created = self.fetch(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "workers", id)
                    .by(session)
                    .after(&created),
            )
            .await;

        Ok(id)
    }

    /// Updates the profile fields. The role is changed through `assign_role`.
    pub async fn update_worker(
        &self,
        session: &Session,
        worker_id: i64,
        input: WorkerInput,
    ) -> DbResult<Worker> {
        session.require_permission(PermissionToken::UsuariosEditar)?;
        let input = input.validate()?;
        let before = self.fetch(worker_id).await?;
        self.ensure_unique(&input, worker_id).await?;

        sqlx::query(
            r#"
            UPDATE workers SET
                name = ?2, surname = ?3, sex = ?4, birth_date = ?5, doc_type = ?6,
                doc_number = ?7, phone = ?8, address = ?9, username = ?10, email = ?11
            WHERE id = ?1
            "#,
        )
        .bind(worker_id)
        .bind(&input.name)
        .bind(&input.surname)
        .bind(input.sex)
        .bind(input.birth_date)
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.username)
        .bind(&input.email)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_key("Worker", input.username.clone()))?;

        let after = self.fetch(worker_id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "workers", worker_id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// Activates or deactivates a worker. Inactive workers cannot log in.
    pub async fn set_worker_active(
        &self,
        session: &Session,
        worker_id: i64,
        active: bool,
    ) -> DbResult<()> {
        session.require_permission(PermissionToken::UsuariosEditar)?;
        let before = self.fetch(worker_id).await?;

        sqlx::query("UPDATE workers SET active = ?2 WHERE id = ?1")
            .bind(worker_id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        info!(worker_id, active, "Worker activation changed");

        let after = Worker { active, ..before.clone() };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "workers", worker_id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(())
    }

    /// Moves a worker to another role.
    ///
    /// When the worker is the session's own, the session's permission set is
    /// reloaded before returning.
    pub async fn assign_role(
        &self,
        session: &mut Session,
        worker_id: i64,
        role_id: i64,
    ) -> DbResult<()> {
        session.require_permission(PermissionToken::UsuariosAsignarRoles)?;
        let before = self.fetch(worker_id).await?;
        if !row_exists(&self.pool, "roles", role_id).await? {
            return Err(DbError::not_found("Role", role_id));
        }

        sqlx::query("UPDATE workers SET role_id = ?2 WHERE id = ?1")
            .bind(worker_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;

        info!(worker_id, from = before.role_id, to = role_id, "Role assigned");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "workers", worker_id)
                    .by(session)
                    .before(&RoleChange { role_id: before.role_id })
                    .after(&RoleChange { role_id }),
            )
            .await;

        if session.worker_id == worker_id {
            let perms = permission_set_of(&self.pool, role_id).await?;
            session.replace_permissions(role_id, perms);
        }
        Ok(())
    }

    /// Changes the session worker's own password after checking the current one.
    pub async fn change_password(
        &self,
        session: &Session,
        current: &str,
        new_password: &str,
    ) -> DbResult<()> {
        let worker = self.fetch(session.worker_id).await?;
        if check_password(current, &worker.password_hash) == PasswordMatch::Mismatch {
            return Err(CoreError::AuthFailed.into());
        }
        validate_password(new_password)?;

        let hash = hash_password(new_password)?;
        self.update_password_hash(worker.id, &hash).await?;

        info!(worker_id = worker.id, "Password changed");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "workers", worker.id)
                    .by(session)
                    .after(&serde_json::json!({ "password_changed": true })),
            )
            .await;

        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_worker(&self, session: &Session, worker_id: i64) -> DbResult<Worker> {
        session.require_permission(PermissionToken::UsuariosVer)?;
        self.fetch(worker_id).await
    }

    pub async fn list_workers(&self, session: &Session) -> DbResult<Vec<Worker>> {
        session.require_permission(PermissionToken::UsuariosVer)?;

        let sql = format!("{} ORDER BY surname, name", WORKER_SELECT);
        let workers = sqlx::query_as::<_, Worker>(&sql).fetch_all(&self.pool).await?;
        Ok(workers)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}

#[async_trait]
impl WorkerLookup for WorkerRepository {
    async fn find_by_login(&self, login: &str) -> DbResult<Option<Worker>> {
        let sql = format!(
            "{} WHERE username = ?1 OR email = ?1 ORDER BY id LIMIT 1",
            WORKER_SELECT
        );
        let worker = sqlx::query_as::<_, Worker>(&sql)
            .bind(login.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(worker)
    }

    async fn find_by_id(&self, worker_id: i64) -> DbResult<Option<Worker>> {
        let sql = format!("{} WHERE id = ?1", WORKER_SELECT);
        let worker = sqlx::query_as::<_, Worker>(&sql)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(worker)
    }

    async fn update_password_hash(&self, worker_id: i64, hash: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE workers SET password_hash = ?2 WHERE id = ?1")
            .bind(worker_id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Worker", worker_id));
        }
        Ok(())
    }
}
