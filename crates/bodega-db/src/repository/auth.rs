//! # Authentication Service
//!
//! Login, session permission loading and password recovery.
//!
//! ## Login Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  authenticate(login, password, ip)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  WorkerLookup::find_by_login (exact username or email)                 │
//! │       │                                                                 │
//! │       ├── unknown / inactive / wrong password                          │
//! │       │      └── warn!, LOGIN audit as SYSTEM {"success": false}       │
//! │       │          AUTH_FAILED (same message for every cause)            │
//! │       │                                                                 │
//! │       ├── legacy SHA-256 hash matched                                  │
//! │       │      └── re-hash with Argon2id and store                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load role permissions ──► Session { uuid, worker, role, perms, ip }   │
//! │       └── LOGIN audit as the worker                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reset Tokens
//! 32 random bytes, handed out once as 64 hex characters. Only the SHA-256
//! of the token is stored, with a 30 minute expiry and a one-shot `used` flag.

use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use bodega_core::token::{encode_token, is_legacy_sha256, sha256_hex, verify_legacy_sha256};
use bodega_core::validation::validate_password;
use bodega_core::{AuditAction, CoreError, ResetToken, Session, RESET_TOKEN_TTL_MINUTES};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::role::RoleRepository;
use crate::repository::worker::WorkerLookup;

// =============================================================================
// Password hashing
// =============================================================================

/// Result of checking a password against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PasswordMatch {
    /// Matched an Argon2 PHC string.
    Current,
    /// Matched a legacy unsalted SHA-256 digest; the hash should be upgraded.
    Legacy,
    Mismatch,
}

/// Hashes a password with Argon2id and a fresh random salt.
pub(crate) fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

pub(crate) fn check_password(password: &str, stored: &str) -> PasswordMatch {
    if is_legacy_sha256(stored) {
        return if verify_legacy_sha256(password, stored) {
            PasswordMatch::Legacy
        } else {
            PasswordMatch::Mismatch
        };
    }

    let parsed = match PasswordHash::new(stored) {
        Ok(h) => h,
        Err(_) => return PasswordMatch::Mismatch,
    };

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
    {
        PasswordMatch::Current
    } else {
        PasswordMatch::Mismatch
    }
}

// =============================================================================
// Service
// =============================================================================

pub struct AuthService {
    pool: SqlitePool,
    ctx: StoreContext,
    workers: Arc<dyn WorkerLookup>,
    roles: RoleRepository,
}

impl AuthService {
    pub fn new(
        pool: SqlitePool,
        ctx: StoreContext,
        workers: Arc<dyn WorkerLookup>,
        roles: RoleRepository,
    ) -> Self {
        AuthService {
            pool,
            ctx,
            workers,
            roles,
        }
    }

    /// Checks credentials and opens a session.
    ///
    /// `ip` is a hint recorded in audit entries; loopback when absent.
    /// Every failure cause returns the same `AUTH_FAILED`.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
        ip: Option<&str>,
    ) -> DbResult<Session> {
        debug!(login = %login, "Authenticating");

        let worker = match self.workers.find_by_login(login).await? {
            Some(w) if w.active => w,
            found => {
                let reason = if found.is_some() { "inactive worker" } else { "unknown login" };
                return Err(self.reject(login, found.map(|w| w.id), ip, reason).await);
            }
        };

        match check_password(password, &worker.password_hash) {
            PasswordMatch::Mismatch => {
                return Err(self.reject(login, Some(worker.id), ip, "wrong password").await);
            }
            PasswordMatch::Legacy => {
                // upgrade failure must not block the login
                match hash_password(password) {
                    Ok(hash) => {
                        if let Err(e) = self.workers.update_password_hash(worker.id, &hash).await {
                            warn!(worker_id = worker.id, error = %e, "Legacy hash upgrade failed");
                        } else {
                            info!(worker_id = worker.id, "Legacy password hash upgraded");
                        }
                    }
                    Err(e) => {
                        warn!(worker_id = worker.id, error = %e, "Legacy hash upgrade failed")
                    }
                }
            }
            PasswordMatch::Current => {}
        }

        let permissions = self.roles.permission_set(worker.role_id).await?;
        let mut session = Session::new(
            worker.id,
            worker.display_name(),
            worker.username.clone(),
            worker.role_id,
            permissions,
            self.ctx.now(),
        );
        session = session.with_ip(ip.unwrap_or(self.ctx.default_ip()));

        info!(
            worker_id = worker.id,
            session_id = %session.session_id,
            permissions = session.permissions.len(),
            "Login succeeded"
        );

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Login, "workers", worker.id)
                    .by(&session)
                    .after(&serde_json::json!({ "success": true })),
            )
            .await;

        Ok(session)
    }

    async fn reject(
        &self,
        login: &str,
        worker_id: Option<i64>,
        ip: Option<&str>,
        reason: &str,
    ) -> DbError {
        warn!(login = %login, reason, "Login rejected");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Login, "workers", worker_id.unwrap_or(0))
                    .ip(ip)
                    .after(&serde_json::json!({ "success": false, "login": login })),
            )
            .await;

        CoreError::AuthFailed.into()
    }

    /// Re-reads the worker's role and its permission set into the session.
    pub async fn reload_permissions(&self, session: &mut Session) -> DbResult<()> {
        let worker = self
            .workers
            .find_by_id(session.worker_id)
            .await?
            .ok_or_else(|| DbError::not_found("Worker", session.worker_id))?;

        let permissions = self.roles.permission_set(worker.role_id).await?;
        debug!(worker_id = worker.id, role_id = worker.role_id, "Permissions reloaded");
        session.replace_permissions(worker.role_id, permissions);
        Ok(())
    }

    // =========================================================================
    // Password recovery
    // =========================================================================

    /// Creates a reset token for a worker and returns its plaintext form.
    /// The plaintext is not stored anywhere.
    pub async fn issue_reset_token(&self, worker_id: i64) -> DbResult<String> {
        if self.workers.find_by_id(worker_id).await?.is_none() {
            return Err(DbError::not_found("Worker", worker_id));
        }

        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let token = encode_token(&bytes);

        let created_at = self.ctx.now();
        let expires_at = created_at + Duration::minutes(RESET_TOKEN_TTL_MINUTES);

        let id = sqlx::query(
            "INSERT INTO reset_tokens (worker_id, token_hash, created_at, expires_at, used) VALUES (?1, ?2, ?3, ?4, 0)",
        )
        .bind(worker_id)
        .bind(sha256_hex(&token))
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        info!(worker_id, token_id = id, "Reset token issued");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::RecoverPassword, "reset_tokens", id)
                    .after(&serde_json::json!({
                        "worker_id": worker_id,
                        "expires_at": expires_at,
                    })),
            )
            .await;

        Ok(token)
    }

    /// Validates a token and marks it used inside the caller's transaction.
    async fn accept_in(&self, conn: &mut SqliteConnection, token: &str) -> DbResult<ResetToken> {
        let found = sqlx::query_as::<_, ResetToken>(
            "SELECT id, worker_id, token_hash, created_at, expires_at, used FROM reset_tokens WHERE token_hash = ?1",
        )
        .bind(sha256_hex(token.trim()))
        .fetch_optional(&mut *conn)
        .await?;

        let record = match found {
            Some(t) if !t.used => t,
            _ => return Err(DbError::not_found("ResetToken", "token")),
        };

        if record.is_expired(self.ctx.now()) {
            return Err(CoreError::forbidden("ResetToken", record.id, "expired").into());
        }

        let result = sqlx::query("UPDATE reset_tokens SET used = 1 WHERE id = ?1 AND used = 0")
            .bind(record.id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ResetToken", "token"));
        }

        Ok(ResetToken { used: true, ..record })
    }

    /// Accepts a token once. Returns the worker it belongs to.
    ///
    /// ## Errors
    /// - `NOT_FOUND` for an unknown or already used token
    /// - `STATE_FORBIDDEN` for an expired token
    pub async fn accept_reset_token(&self, token: &str) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;
        let record = self.accept_in(&mut tx, token).await?;
        tx.commit().await?;
        Ok(record.worker_id)
    }

    /// Accepts the token and sets the new password in one transaction.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> DbResult<()> {
        validate_password(new_password)?;
        let hash = hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;
        let record = self.accept_in(&mut tx, token).await?;

        sqlx::query("UPDATE workers SET password_hash = ?2 WHERE id = ?1")
            .bind(record.worker_id)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(worker_id = record.worker_id, "Password reset");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::RecoverPassword, "workers", record.worker_id)
                    .after(&serde_json::json!({ "password_reset": true })),
            )
            .await;

        Ok(())
    }

    /// Deletes expired tokens. Returns how many were removed.
    pub async fn purge_expired_tokens(&self) -> DbResult<u64> {
        let removed = sqlx::query("DELETE FROM reset_tokens WHERE expires_at < ?1")
            .bind(self.ctx.now())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed > 0 {
            info!(removed, "Expired reset tokens purged");
        }
        Ok(removed)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use bodega_core::{ErrorKind, PermissionChecker, PermissionToken, SYSTEM_ACTOR};

    #[test]
    fn test_hash_and_check() {
        let hash = hash_password("clave-segura").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(check_password("clave-segura", &hash), PasswordMatch::Current);
        assert_eq!(check_password("otra-clave", &hash), PasswordMatch::Mismatch);

        // same password, different salt
        assert_ne!(hash, hash_password("clave-segura").unwrap());

        let legacy = sha256_hex("clave-vieja");
        assert_eq!(check_password("clave-vieja", &legacy), PasswordMatch::Legacy);
        assert_eq!(check_password("nope", "not-a-hash"), PasswordMatch::Mismatch);
    }

    async fn with_worker(db: &crate::Database, password: &str) -> i64 {
        db.roles().seed_permissions().await.unwrap();
        let role = insert_role(db, "Cajero").await;
        let mut admin = admin_session(0);
        db.roles()
            .grant_permission(&mut admin, role, PermissionToken::VentasCrear)
            .await
            .unwrap();
        db.workers()
            .create_worker(
                &admin,
                worker_input("carla", "carla@bodega.com", "V12345678"),
                role,
                password,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_by_username_and_email() {
        let db = memory_db().await;
        let id = with_worker(&db, "clave-segura").await;

        let session = db
            .auth()
            .authenticate("carla", "clave-segura", Some("10.0.0.7"))
            .await
            .unwrap();
        assert_eq!(session.worker_id, id);
        assert_eq!(session.display_name, "Carla Gómez");
        assert_eq!(session.ip, "10.0.0.7");
        assert!(session.has_permission(PermissionToken::VentasCrear));
        assert!(!session.has_permission(PermissionToken::UsuariosVer));

        let by_email = db
            .auth()
            .authenticate("carla@bodega.com", "clave-segura", None)
            .await
            .unwrap();
        assert_eq!(by_email.ip, "127.0.0.1");
        assert_ne!(by_email.session_id, session.session_id);
    }

    #[tokio::test]
    async fn test_failures_are_generic_and_audited() {
        let db = memory_db().await;
        let id = with_worker(&db, "clave-segura").await;
        let auth = db.auth();

        let wrong = auth.authenticate("carla", "mala-clave", None).await.unwrap_err();
        let unknown = auth.authenticate("nadie", "clave-segura", None).await.unwrap_err();
        assert_eq!(wrong.kind(), ErrorKind::AuthFailed);
        assert_eq!(wrong.to_string(), unknown.to_string());

        db.workers().set_worker_active(&admin_session(0), id, false).await.unwrap();
        let inactive = auth.authenticate("carla", "clave-segura", None).await.unwrap_err();
        assert_eq!(inactive.kind(), ErrorKind::AuthFailed);

        let trail = db.audit().by_actor(&admin_session(0), SYSTEM_ACTOR).await.unwrap();
        let failed_logins = trail
            .iter()
            .filter(|e| e.action == AuditAction::Login)
            .filter(|e| e.after.as_deref().unwrap_or("").contains("\"success\":false"))
            .count();
        assert_eq!(failed_logins, 3);
    }

    #[tokio::test]
    async fn test_legacy_hash_is_upgraded_on_login() {
        let db = memory_db().await;
        let id = with_worker(&db, "clave-segura").await;
        sqlx::query("UPDATE workers SET password_hash = ?2 WHERE id = ?1")
            .bind(id)
            .bind(sha256_hex("clave-vieja"))
            .execute(db.pool())
            .await
            .unwrap();

        db.auth().authenticate("carla", "clave-vieja", None).await.unwrap();

        let stored = db.workers().find_by_id(id).await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2"));
        db.auth().authenticate("carla", "clave-vieja", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_token_single_use() {
        let (db, _clock) = memory_db_at(may_first_noon()).await;
        let id = with_worker(&db, "clave-segura").await;
        let auth = db.auth();

        let token = auth.issue_reset_token(id).await.unwrap();
        assert_eq!(token.len(), 64);

        let stored: String = sqlx::query_scalar("SELECT token_hash FROM reset_tokens")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_ne!(stored, token);

        auth.reset_password(&token, "clave-nueva-1").await.unwrap();
        auth.authenticate("carla", "clave-nueva-1", None).await.unwrap();

        let err = auth.reset_password(&token, "clave-nueva-2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = auth.accept_reset_token("ffff").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_expired_token_and_purge() {
        let (db, clock) = memory_db_at(may_first_noon()).await;
        let id = with_worker(&db, "clave-segura").await;
        let auth = db.auth();

        let token = auth.issue_reset_token(id).await.unwrap();
        clock.advance(Duration::minutes(31));

        let err = auth.accept_reset_token(&token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateForbidden);

        // a failed reset leaves the old password in place
        let err = auth.reset_password(&token, "clave-nueva-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateForbidden);
        auth.authenticate("carla", "clave-segura", None).await.unwrap();

        assert_eq!(auth.purge_expired_tokens().await.unwrap(), 1);
        assert_eq!(auth.purge_expired_tokens().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reload_permissions_follows_role() {
        let db = memory_db().await;
        let id = with_worker(&db, "clave-segura").await;
        let mut session = db.auth().authenticate("carla", "clave-segura", None).await.unwrap();

        let mut admin = admin_session(0);
        db.roles()
            .grant_permission(&mut admin, session.role_id, PermissionToken::ReportesVentas)
            .await
            .unwrap();
        assert!(!session.has_permission(PermissionToken::ReportesVentas));

        db.auth().reload_permissions(&mut session).await.unwrap();
        assert!(session.has_permission(PermissionToken::ReportesVentas));
        assert_eq!(session.worker_id, id);
    }
}
