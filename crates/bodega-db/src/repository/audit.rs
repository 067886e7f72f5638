//! # Audit Log
//!
//! Append-only record of who did what, when, to which record.
//!
//! ## Write Policy
//! ```text
//! business tx ──► COMMIT ──► AuditLog::record_best_effort(event)
//!                                  │
//!                                  ├── Ok   → entry appended
//!                                  └── Err  → tracing::error!, business
//!                                             result returned unchanged
//! ```
//!
//! The table rejects UPDATE and DELETE through triggers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error};

use bodega_core::{
    AuditAction, AuditEntry, PermissionChecker, PermissionToken, Session, SYSTEM_ACTOR,
};

use crate::error::DbResult;
use crate::pool::StoreContext;

/// One audit event before it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub actor: String,
    pub action: AuditAction,
    pub table: String,
    pub record_id: i64,
    pub before: Option<String>,
    pub after: Option<String>,
    pub ip: Option<String>,
}

impl AuditEvent {
    /// An event attributed to `SYSTEM`.
    pub fn new(action: AuditAction, table: &str, record_id: i64) -> Self {
        AuditEvent {
            actor: SYSTEM_ACTOR.to_string(),
            action,
            table: table.to_string(),
            record_id,
            before: None,
            after: None,
            ip: None,
        }
    }

    /// Attributes the event to the session's worker and IP.
    pub fn by(mut self, session: &Session) -> Self {
        self.actor = session.display_name.clone();
        self.ip = Some(session.ip.clone());
        self
    }

    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self
    }

    /// JSON snapshot of the record before the change.
    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_string(value).ok();
        self
    }

    /// JSON snapshot of the record after the change.
    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_string(value).ok();
        self
    }
}

/// Handle on the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLog {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl AuditLog {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        AuditLog { pool, ctx }
    }

    /// Appends an entry in its own statement and returns its id.
    pub async fn record(&self, event: AuditEvent) -> DbResult<i64> {
        let ts = self.ctx.now();
        let ip = match event.ip.as_deref().map(str::trim) {
            Some(ip) if !ip.is_empty() => ip.to_string(),
            _ => self.ctx.default_ip().to_string(),
        };

        debug!(
            actor = %event.actor,
            action = ?event.action,
            table = %event.table,
            record_id = event.record_id,
            "Writing audit entry"
        );

        let id = sqlx::query(
            r#"
            INSERT INTO audit_log (actor, action, table_name, record_id, before, after, ip, ts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&event.actor)
        .bind(event.action)
        .bind(&event.table)
        .bind(event.record_id)
        .bind(&event.before)
        .bind(&event.after)
        .bind(&ip)
        .bind(ts)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    /// Writes the entry; a failure is reported on the operator channel and
    /// otherwise ignored.
    pub async fn record_best_effort(&self, event: AuditEvent) {
        let action = event.action;
        let table = event.table.clone();
        let record_id = event.record_id;

        if let Err(e) = self.record(event).await {
            error!(
                error = %e,
                action = ?action,
                table = %table,
                record_id,
                "Audit write failed; business change kept"
            );
        }
    }

    /// Entries with `from <= ts <= to`, newest first.
    pub async fn by_range(
        &self,
        session: &Session,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<AuditEntry>> {
        session.require_permission(PermissionToken::UsuariosVer)?;

        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, actor, action, table_name, record_id, before, after, ip, ts
            FROM audit_log
            WHERE ts >= ?1 AND ts <= ?2
            ORDER BY ts DESC, id DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries recorded for `actor` (display name or `SYSTEM`), newest first.
    pub async fn by_actor(&self, session: &Session, actor: &str) -> DbResult<Vec<AuditEntry>> {
        session.require_permission(PermissionToken::UsuariosVer)?;

        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, actor, action, table_name, record_id, before, after, ip, ts
            FROM audit_log
            WHERE actor = ?1
            ORDER BY ts DESC, id DESC
            "#,
        )
        .bind(actor)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// History of one record, newest first.
    pub async fn by_record(
        &self,
        session: &Session,
        table: &str,
        record_id: i64,
    ) -> DbResult<Vec<AuditEntry>> {
        session.require_permission(PermissionToken::UsuariosVer)?;

        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, actor, action, table_name, record_id, before, after, ip, ts
            FROM audit_log
            WHERE table_name = ?1 AND record_id = ?2
            ORDER BY ts DESC, id DESC
            "#,
        )
        .bind(table)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use bodega_core::{ErrorKind, PermissionSet};
    use chrono::Duration;

    fn auditor(perms: &[&str]) -> Session {
        Session::new(1, "Ana Pérez", "ana", 1, PermissionSet::from_names(perms), Utc::now())
    }

    #[tokio::test]
    async fn test_record_and_query_by_record() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let audit = db.audit();
        let session = auditor(&["usuarios_ver"]);

        audit
            .record(
                AuditEvent::new(AuditAction::Create, "categories", 3)
                    .by(&session)
                    .after(&serde_json::json!({"name": "Víveres"})),
            )
            .await
            .unwrap();
        audit
            .record(AuditEvent::new(AuditAction::Modify, "categories", 3).by(&session))
            .await
            .unwrap();

        let history = audit.by_record(&session, "categories", 3).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, AuditAction::Modify);
        assert_eq!(history[1].actor, "Ana Pérez");
        assert_eq!(history[1].ip, "127.0.0.1");
        assert!(history[1].after.as_deref().unwrap().contains("Víveres"));
    }

    #[tokio::test]
    async fn test_system_actor_and_range() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let audit = db.audit();
        let session = auditor(&["usuarios_ver"]);

        audit
            .record(AuditEvent::new(AuditAction::Login, "workers", 0).ip(Some("10.1.1.9")))
            .await
            .unwrap();

        let by_system = audit.by_actor(&session, SYSTEM_ACTOR).await.unwrap();
        assert_eq!(by_system.len(), 1);
        assert_eq!(by_system[0].ip, "10.1.1.9");

        let now = Utc::now();
        let in_range = audit
            .by_range(&session, now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);
    }

    #[tokio::test]
    async fn test_queries_require_usuarios_ver() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .audit()
            .by_actor(&auditor(&["ventas_ver"]), "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_audit_log_is_append_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let id = db
            .audit()
            .record(AuditEvent::new(AuditAction::Consult, "sales", 0))
            .await
            .unwrap();

        let result = sqlx::query("UPDATE audit_log SET actor = 'x' WHERE id = ?1")
            .bind(id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());

        let result = sqlx::query("DELETE FROM audit_log").execute(db.pool()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_best_effort_swallows_write_failures() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            r#"CREATE TRIGGER audit_offline BEFORE INSERT ON audit_log
               BEGIN SELECT RAISE(ABORT, 'audit offline'); END"#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let audit = db.audit();
        assert!(audit.record(AuditEvent::new(AuditAction::Consult, "sales", 0)).await.is_err());
        audit
            .record_best_effort(AuditEvent::new(AuditAction::Consult, "sales", 0))
            .await;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
