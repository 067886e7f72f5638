//! # Incoming Repository
//!
//! Supplier deliveries: one header, its lines, and one IN movement per
//! line, all in a single transaction.
//!
//! ```text
//! record_incoming ──► BEGIN
//!                     ├── worker, supplier exist
//!                     ├── INSERT incoming_docs (REGISTERED)
//!                     ├── per line: INSERT incoming_lines
//!                     │             post IN "INCOMING #<id>" at unit price
//!                     └── COMMIT ──► CREATE audit
//! ```
//!
//! Voiding only flips the state; delivered stock stays in the kardex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use bodega_core::inputs::{IncomingInput, IncomingLineInput};
use bodega_core::{
    AuditAction, CoreError, DocState, IncomingDoc, IncomingLine, Money, MovementKind,
    PermissionChecker, PermissionToken, Session,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::kardex::{KardexRepository, Movement};
use crate::repository::row_exists;

const INCOMING_SELECT: &str = r#"
    SELECT id, supplier_id, worker_id, ts, doc_type, series, number, vat_pct, state
    FROM incoming_docs
"#;

#[derive(Serialize)]
struct IncomingSnapshot<'a> {
    doc: &'a IncomingDoc,
    lines: &'a [IncomingLineInput],
}

#[derive(Debug, Clone)]
pub struct IncomingRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl IncomingRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        IncomingRepository { pool, ctx }
    }

    /// Records a delivery and raises stock. Requires `inventario_ingresos`.
    ///
    /// ## Errors (first failure wins)
    /// - `NOT_FOUND` for an unknown worker or supplier
    /// - `INVALID_ARGUMENT` for empty lines, `qty <= 0`, negative prices
    /// - `NOT_FOUND` for an unknown article
    /// - `CONFLICT` when `(doc_type, series, number, supplier)` exists
    pub async fn record_incoming(&self, session: &Session, input: IncomingInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::InventarioIngresos)?;

        let mut tx = self.pool.begin().await?;

        if !row_exists(&mut *tx, "workers", input.worker_id).await? {
            return Err(DbError::not_found("Worker", input.worker_id));
        }
        if !row_exists(&mut *tx, "suppliers", input.supplier_id).await? {
            return Err(DbError::not_found("Supplier", input.supplier_id));
        }

        let input = input.validate()?;

        debug!(
            supplier_id = input.supplier_id,
            lines = input.lines.len(),
            "Recording incoming delivery"
        );

        let ts = self.ctx.now();
        let doc_key = format!(
            "{} {}-{} supplier {}",
            input.doc_type.code(),
            input.series,
            input.number,
            input.supplier_id
        );

        let incoming_id = sqlx::query(
            r#"
            INSERT INTO incoming_docs (supplier_id, worker_id, ts, doc_type, series, number, vat_pct, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(input.supplier_id)
        .bind(input.worker_id)
        .bind(ts)
        .bind(input.doc_type)
        .bind(&input.series)
        .bind(&input.number)
        .bind(input.vat_pct)
        .bind(DocState::Registered)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_key("IncomingDoc", doc_key.clone()))?
        .last_insert_rowid();

        let ref_doc = format!("INCOMING #{}", incoming_id);
        for line in &input.lines {
            // posting first reports an unknown article as NOT_FOUND
            KardexRepository::post_in(
                &mut tx,
                &self.ctx,
                &Movement {
                    article_id: line.article_id,
                    kind: MovementKind::In,
                    qty: line.qty,
                    ref_doc: &ref_doc,
                    unit_price: Some(Money::from_cents(line.unit_price_cents)),
                },
            )
            .await?;

            sqlx::query(
                r#"
                INSERT INTO incoming_lines (incoming_id, article_id, qty, unit_price_cents)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(incoming_id)
            .bind(line.article_id)
            .bind(line.qty)
            .bind(line.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(incoming_id, doc = %doc_key, "Incoming delivery recorded");

        let doc = IncomingDoc {
            id: incoming_id,
            supplier_id: input.supplier_id,
            worker_id: input.worker_id,
            ts,
            doc_type: input.doc_type,
            series: input.series.clone(),
            number: input.number.clone(),
            vat_pct: input.vat_pct,
            state: DocState::Registered,
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "incoming_docs", incoming_id)
                    .by(session)
                    .after(&IncomingSnapshot {
                        doc: &doc,
                        lines: &input.lines,
                    }),
            )
            .await;

        Ok(incoming_id)
    }

    /// Marks a delivery VOIDED. Stock is not reversed.
    pub async fn void_incoming(&self, session: &Session, incoming_id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::InventarioIngresos)?;

        let before = self.get_incoming(incoming_id).await?;
        let result = sqlx::query("UPDATE incoming_docs SET state = ?2 WHERE id = ?1 AND state = ?3")
            .bind(incoming_id)
            .bind(DocState::Voided)
            .bind(DocState::Registered)
            .execute(&self.pool)
            .await?;

        if before.state == DocState::Voided || result.rows_affected() == 0 {
            return Err(CoreError::forbidden("IncomingDoc", incoming_id, "already voided").into());
        }

        info!(incoming_id, "Incoming delivery voided");

        let after = IncomingDoc {
            state: DocState::Voided,
            ..before.clone()
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Void, "incoming_docs", incoming_id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(())
    }

    pub async fn get_incoming(&self, incoming_id: i64) -> DbResult<IncomingDoc> {
        let sql = format!("{} WHERE id = ?1", INCOMING_SELECT);
        sqlx::query_as::<_, IncomingDoc>(&sql)
            .bind(incoming_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("IncomingDoc", incoming_id))
    }

    pub async fn incoming_lines(&self, incoming_id: i64) -> DbResult<Vec<IncomingLine>> {
        let lines = sqlx::query_as::<_, IncomingLine>(
            r#"
            SELECT id, incoming_id, article_id, qty, unit_price_cents
            FROM incoming_lines
            WHERE incoming_id = ?1
            ORDER BY id
            "#,
        )
        .bind(incoming_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Deliveries with `from <= ts <= to`, oldest first. Requires `inventario_ver`.
    pub async fn list_incoming(
        &self,
        session: &Session,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<IncomingDoc>> {
        session.require_permission(PermissionToken::InventarioVer)?;

        let sql = format!("{} WHERE ts >= ?1 AND ts <= ?2 ORDER BY ts, id", INCOMING_SELECT);
        let docs = sqlx::query_as::<_, IncomingDoc>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(docs)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}
