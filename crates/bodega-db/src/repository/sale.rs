//! # Sale Repository
//!
//! Issues sale documents and takes their stock out of the kardex.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  record_sale(session, input)              one transaction              │
//! │  ├── worker / client exist                                             │
//! │  ├── header + lines validated (SaleCart)                               │
//! │  ├── lock each article, qty ≤ current_stock                            │
//! │  ├── snapshot rate (1.0 for VES, else latest, else RATE_UNAVAILABLE)   │
//! │  ├── INSERT sales (REGISTERED), INSERT sale_lines                      │
//! │  └── one OUT movement per line, ref "SALE #<id>"                       │
//! │       │                                                                 │
//! │       ▼  COMMIT, then CREATE audit                                     │
//! │                                                                         │
//! │  void_sale(session, id)      same local day only                       │
//! │  └── [REGISTERED] ──► [VOIDED]   stock is NOT given back               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Totals are never stored: `sale_totals` rebuilds them from the lines,
//! the VAT percentage and the rate snapshot.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use bodega_core::cart::{SaleCart, SaleTotals};
use bodega_core::inputs::SaleInput;
use bodega_core::{
    AuditAction, CoreError, DocState, MovementKind, PermissionChecker, PermissionToken, SaleDoc,
    SaleLine, Session,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::kardex::{KardexRepository, Movement};
use crate::repository::rate::RateRepository;
use crate::repository::row_exists;

const SALE_SELECT: &str = r#"
    SELECT id, client_id, worker_id, ts, sale_date, doc_type, series, number,
           vat_pct, state, payment_ccy, sale_ccy, snapshot_rate
    FROM sales
"#;

/// Audit snapshot of a recorded sale.
#[derive(Serialize)]
struct SaleSnapshot<'a> {
    sale: &'a SaleDoc,
    lines: &'a SaleCart,
    totals: SaleTotals,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        SaleRepository { pool, ctx }
    }

    /// Records a sale and posts one OUT movement per line.
    ///
    /// ## Preconditions (first failure wins)
    /// 1. Session holds `ventas_crear`
    /// 2. Worker exists; client exists when given
    /// 3. Header fields pass their contracts, then the lines do
    /// 4. Every article exists and has stock for the total requested
    /// 5. A rate exists when the payment currency is not the base one
    ///
    /// Any failure rolls the whole transaction back.
    pub async fn record_sale(&self, session: &Session, input: SaleInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::VentasCrear)?;

        let mut tx = self.pool.begin().await?;

        if !row_exists(&mut *tx, "workers", input.worker_id).await? {
            return Err(DbError::not_found("Worker", input.worker_id));
        }
        if let Some(client_id) = input.client_id {
            if !row_exists(&mut *tx, "clients", client_id).await? {
                return Err(DbError::not_found("Client", client_id));
            }
        }

        let (input, cart) = input.validate()?;

        debug!(
            worker_id = input.worker_id,
            lines = cart.lines().len(),
            payment_ccy = %input.payment_ccy,
            "Recording sale"
        );

        Self::check_stock(&mut tx, &cart).await?;

        let snapshot_rate = RateRepository::snapshot_in(&mut tx, input.payment_ccy).await?;
        let totals = cart.totals(snapshot_rate)?;
        let ts = self.ctx.now();
        let sale_date = self.ctx.local_date(ts);

        let doc_key = format!("{} {}-{}", input.doc_type.code(), input.series, input.number);
        let sale_id = sqlx::query(
            r#"
            INSERT INTO sales (
                client_id, worker_id, ts, sale_date, doc_type, series, number,
                vat_pct, state, payment_ccy, sale_ccy, snapshot_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(input.client_id)
        .bind(input.worker_id)
        .bind(ts)
        .bind(sale_date)
        .bind(input.doc_type)
        .bind(&input.series)
        .bind(&input.number)
        .bind(input.vat_pct)
        .bind(DocState::Registered)
        .bind(input.payment_ccy)
        .bind(input.payment_ccy)
        .bind(snapshot_rate)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::from(e).with_duplicate_key("Sale", doc_key.clone()))?
        .last_insert_rowid();

        let ref_doc = format!("SALE #{}", sale_id);
        for line in cart.lines() {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (sale_id, article_id, qty, unit_price_cents)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(sale_id)
            .bind(line.article_id)
            .bind(line.qty)
            .bind(line.unit_price.cents())
            .execute(&mut *tx)
            .await?;

            KardexRepository::post_in(
                &mut tx,
                &self.ctx,
                &Movement {
                    article_id: line.article_id,
                    kind: MovementKind::Out,
                    qty: line.qty,
                    ref_doc: &ref_doc,
                    unit_price: Some(line.unit_price),
                },
            )
            .await?;
        }

        tx.commit().await?;

        let sale = SaleDoc {
            id: sale_id,
            client_id: input.client_id,
            worker_id: input.worker_id,
            ts,
            sale_date,
            doc_type: input.doc_type,
            series: input.series,
            number: input.number,
            vat_pct: input.vat_pct,
            state: DocState::Registered,
            payment_ccy: input.payment_ccy,
            sale_ccy: input.payment_ccy,
            snapshot_rate,
        };
        info!(
            sale_id,
            doc = %doc_key,
            total = %totals.total_sale_ccy.format_in(sale.sale_ccy),
            "Sale recorded"
        );

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "sales", sale_id)
                    .by(session)
                    .after(&SaleSnapshot {
                        sale: &sale,
                        lines: &cart,
                        totals,
                    }),
            )
            .await;

        Ok(sale_id)
    }

    /// Locks every article of the cart and checks the aggregated quantity
    /// against its stock. Articles are locked in first-seen order.
    async fn check_stock(conn: &mut SqliteConnection, cart: &SaleCart) -> DbResult<()> {
        for (article_id, requested) in cart.qty_by_article() {
            KardexRepository::lock_article(conn, article_id).await?;
            let available = KardexRepository::stock_in(conn, article_id).await?;
            if requested > available {
                return Err(CoreError::StockWouldGoNegative {
                    article_id,
                    available,
                    requested,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Voids a sale recorded today (shop-local date).
    ///
    /// Stock is not returned to the kardex.
    ///
    /// ## Errors
    /// - `NOT_FOUND` when the sale does not exist
    /// - `STATE_FORBIDDEN` when already voided or from another day
    pub async fn void_sale(&self, session: &Session, sale_id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::VentasCrear)?;

        let before = self.get_sale(sale_id).await?;
        if before.state == DocState::Voided {
            return Err(CoreError::forbidden("Sale", sale_id, "already voided").into());
        }
        if before.sale_date != self.ctx.today() {
            return Err(
                CoreError::forbidden("Sale", sale_id, "only same-day sales can be voided").into(),
            );
        }

        let result = sqlx::query("UPDATE sales SET state = ?2 WHERE id = ?1 AND state = ?3")
            .bind(sale_id)
            .bind(DocState::Voided)
            .bind(DocState::Registered)
            .execute(&self.pool)
            .await?;

        // lost a race with another void
        if result.rows_affected() == 0 {
            return Err(CoreError::forbidden("Sale", sale_id, "already voided").into());
        }

        info!(sale_id, "Sale voided");

        let after = SaleDoc {
            state: DocState::Voided,
            ..before.clone()
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Void, "sales", sale_id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(())
    }

    /// Gets a sale header by id.
    pub async fn get_sale(&self, sale_id: i64) -> DbResult<SaleDoc> {
        let sql = format!("{} WHERE id = ?1", SALE_SELECT);
        sqlx::query_as::<_, SaleDoc>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))
    }

    /// Lines of a sale in submission order.
    pub async fn sale_lines(&self, sale_id: i64) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT id, sale_id, article_id, qty, unit_price_cents
            FROM sale_lines
            WHERE sale_id = ?1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Recomputes the totals of a stored sale.
    pub async fn sale_totals(&self, sale_id: i64) -> DbResult<SaleTotals> {
        let sale = self.get_sale(sale_id).await?;
        let lines = self.sale_lines(sale_id).await?;
        Ok(SaleCart::from_lines(sale.vat_pct, &lines).totals(sale.snapshot_rate)?)
    }

    /// Sales whose local date falls in `[from, to]`, oldest first.
    pub async fn list_sales(
        &self,
        session: &Session,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<SaleDoc>> {
        session.require_permission(PermissionToken::VentasVer)?;

        let sql = format!(
            "{} WHERE sale_date >= ?1 AND sale_date <= ?2 ORDER BY ts, id",
            SALE_SELECT
        );
        let sales = sqlx::query_as::<_, SaleDoc>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
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
    use bodega_core::cart::CartLine;
    use bodega_core::{Currency, DocumentType, ErrorKind, Money};
    use chrono::Duration;

    struct Shop {
        db: crate::Database,
        clock: bodega_core::ManualClock,
        worker: i64,
        harina: i64,
        arroz: i64,
    }

    async fn shop() -> Shop {
        let (db, clock) = memory_db_at(may_first_noon()).await;
        let role = insert_role(&db, "Cajero").await;
        let worker = insert_worker(&db, role, "ana").await;
        let harina = insert_article(&db, "HAR-01", 150).await;
        let arroz = insert_article(&db, "ARR-01", 200).await;
        stock_up(&db, harina, 10).await;
        stock_up(&db, arroz, 3).await;
        Shop {
            db,
            clock,
            worker,
            harina,
            arroz,
        }
    }

    fn ticket(worker: i64, number: &str, ccy: Currency, lines: Vec<CartLine>) -> SaleInput {
        SaleInput {
            worker_id: worker,
            client_id: None,
            doc_type: DocumentType::Ticket,
            series: "T001".into(),
            number: number.into(),
            vat_pct: 16.0,
            payment_ccy: ccy,
            lines,
        }
    }

    #[tokio::test]
    async fn test_record_sale_posts_out_movements() {
        let s = shop().await;
        let session = admin_session(s.worker);

        let id = s
            .db
            .sales()
            .record_sale(
                &session,
                ticket(
                    s.worker,
                    "1",
                    Currency::Ves,
                    vec![
                        CartLine::new(s.harina, 4, Money::from_cents(150)),
                        CartLine::new(s.arroz, 1, Money::from_cents(200)),
                    ],
                ),
            )
            .await
            .unwrap();

        let kardex = s.db.kardex();
        assert_eq!(kardex.current_stock(s.harina).await.unwrap(), 6);
        assert_eq!(kardex.current_stock(s.arroz).await.unwrap(), 2);

        let posted = kardex.entries_for_ref(&format!("SALE #{}", id)).await.unwrap();
        assert_eq!(posted.len(), 2);
        assert!(posted.iter().all(|e| e.kind == MovementKind::Out));

        let sale = s.db.sales().get_sale(id).await.unwrap();
        assert_eq!(sale.state, DocState::Registered);
        assert_eq!(sale.snapshot_rate, 1.0);
        assert_eq!(sale.sale_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        // 800 + 16% = 928
        let totals = s.db.sales().sale_totals(id).await.unwrap();
        assert_eq!(totals.subtotal.cents(), 800);
        assert_eq!(totals.total_sale_ccy.cents(), 928);
        assert_eq!(totals.total_base_ccy.cents(), 928);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_nothing_behind() {
        let s = shop().await;
        let session = admin_session(s.worker);

        // two lines of the same article exceed stock together
        let err = s
            .db
            .sales()
            .record_sale(
                &session,
                ticket(
                    s.worker,
                    "1",
                    Currency::Ves,
                    vec![
                        CartLine::new(s.harina, 1, Money::from_cents(150)),
                        CartLine::new(s.arroz, 2, Money::from_cents(200)),
                        CartLine::new(s.arroz, 2, Money::from_cents(200)),
                    ],
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StockWouldGoNegative);

        assert_eq!(s.db.kardex().current_stock(s.harina).await.unwrap(), 10);
        assert_eq!(s.db.kardex().current_stock(s.arroz).await.unwrap(), 3);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(s.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_foreign_currency_needs_rate() {
        let s = shop().await;
        let session = admin_session(s.worker);
        let line = vec![CartLine::new(s.harina, 1, Money::from_cents(500))];

        let err = s
            .db
            .sales()
            .record_sale(&session, ticket(s.worker, "1", Currency::Usd, line.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateUnavailable);
        assert_eq!(s.db.kardex().current_stock(s.harina).await.unwrap(), 10);

        s.db.rates()
            .record_rate(&session, "BCV", Currency::Usd, 60.0, None)
            .await
            .unwrap();
        let id = s
            .db
            .sales()
            .record_sale(&session, ticket(s.worker, "1", Currency::Usd, line))
            .await
            .unwrap();

        // a later rate does not touch the snapshot
        s.db.rates()
            .record_rate(&session, "BCV", Currency::Usd, 65.0, None)
            .await
            .unwrap();

        let sale = s.db.sales().get_sale(id).await.unwrap();
        assert_eq!(sale.snapshot_rate, 60.0);
        assert_eq!(sale.sale_ccy, Currency::Usd);
        let totals = s.db.sales().sale_totals(id).await.unwrap();
        assert_eq!(totals.total_sale_ccy.cents(), 580);
        assert_eq!(totals.total_base_ccy.cents(), 34_800);

        let update = sqlx::query("UPDATE sales SET snapshot_rate = 1.0 WHERE id = ?1")
            .bind(id)
            .execute(s.db.pool())
            .await;
        assert!(update.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_number_is_conflict() {
        let s = shop().await;
        let session = admin_session(s.worker);
        let line = vec![CartLine::new(s.harina, 1, Money::from_cents(150))];

        s.db.sales()
            .record_sale(&session, ticket(s.worker, "7", Currency::Ves, line.clone()))
            .await
            .unwrap();
        let err = s
            .db
            .sales()
            .record_sale(&session, ticket(s.worker, "7", Currency::Ves, line))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(s.db.kardex().current_stock(s.harina).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_missing_references_and_bad_lines() {
        let s = shop().await;
        let session = admin_session(s.worker);

        let mut input = ticket(
            s.worker,
            "1",
            Currency::Ves,
            vec![CartLine::new(s.harina, 1, Money::from_cents(150))],
        );
        input.client_id = Some(404);
        let err = s.db.sales().record_sale(&session, input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let input = ticket(
            s.worker,
            "1",
            Currency::Ves,
            vec![CartLine::new(999, 1, Money::from_cents(150))],
        );
        let err = s.db.sales().record_sale(&session, input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let input = ticket(s.worker, "1", Currency::Ves, vec![]);
        let err = s.db.sales().record_sale(&session, input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let input = ticket(
            s.worker,
            "1",
            Currency::Ves,
            vec![CartLine::new(s.harina, 1, Money::zero())],
        );
        let err = s.db.sales().record_sale(&session, input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_requires_ventas_crear() {
        let s = shop().await;
        let session = session_with(s.worker, &["ventas_ver"]);
        let input = ticket(
            s.worker,
            "1",
            Currency::Ves,
            vec![CartLine::new(s.harina, 1, Money::from_cents(150))],
        );
        let err = s.db.sales().record_sale(&session, input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_void_same_day_only() {
        let s = shop().await;
        let session = admin_session(s.worker);
        let line = vec![CartLine::new(s.harina, 2, Money::from_cents(150))];

        let today = s
            .db
            .sales()
            .record_sale(&session, ticket(s.worker, "1", Currency::Ves, line.clone()))
            .await
            .unwrap();
        s.db.sales().void_sale(&session, today).await.unwrap();
        assert_eq!(s.db.sales().get_sale(today).await.unwrap().state, DocState::Voided);

        // stock stays out
        assert_eq!(s.db.kardex().current_stock(s.harina).await.unwrap(), 8);

        let err = s.db.sales().void_sale(&session, today).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateForbidden);

        let yesterday = s
            .db
            .sales()
            .record_sale(&session, ticket(s.worker, "2", Currency::Ves, line))
            .await
            .unwrap();
        s.clock.advance(Duration::days(1));
        let err = s.db.sales().void_sale(&session, yesterday).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateForbidden);

        let err = s.db.sales().void_sale(&session, 404).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_sale_is_audited_and_listed() {
        let s = shop().await;
        let session = admin_session(s.worker);
        let id = s
            .db
            .sales()
            .record_sale(
                &session,
                ticket(
                    s.worker,
                    "1",
                    Currency::Ves,
                    vec![CartLine::new(s.harina, 1, Money::from_cents(150))],
                ),
            )
            .await
            .unwrap();

        let trail = s.db.audit().by_record(&session, "sales", id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Create);

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let listed = s.db.sales().list_sales(&session, day, day).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(s.db.sales().sale_lines(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_worker_reported_before_line_checks() {
        let s = shop().await;
        let session = admin_session(s.worker);

        let err = s
            .db
            .sales()
            .record_sale(&session, ticket(404, "1", Currency::Ves, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut bad_client = ticket(s.worker, "1", Currency::Ves, vec![]);
        bad_client.client_id = Some(404);
        let err = s.db.sales().record_sale(&session, bad_client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = s
            .db
            .sales()
            .record_sale(&session, ticket(s.worker, "1", Currency::Ves, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_overflowing_amounts_are_rejected() {
        let s = shop().await;
        let session = admin_session(s.worker);
        let sales = s.db.sales();

        let huge_line = CartLine::new(s.harina, 2, Money::from_cents(i64::MAX / 2 + 1));
        let err = sales
            .record_sale(&session, ticket(s.worker, "1", Currency::Ves, vec![huge_line]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // the line fits, the VAT on top of it does not
        let huge_total = CartLine::new(s.harina, 1, Money::from_cents(i64::MAX - 1));
        let err = sales
            .record_sale(&session, ticket(s.worker, "2", Currency::Ves, vec![huge_total]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(s.db.kardex().current_stock(s.harina).await.unwrap(), 10);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(s.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_sale_survives_audit_failure() {
        let s = shop().await;
        let session = admin_session(s.worker);
        sqlx::query(
            r#"CREATE TRIGGER audit_offline BEFORE INSERT ON audit_log
               BEGIN SELECT RAISE(ABORT, 'audit offline'); END"#,
        )
        .execute(s.db.pool())
        .await
        .unwrap();

        let id = s
            .db
            .sales()
            .record_sale(
                &session,
                ticket(
                    s.worker,
                    "1",
                    Currency::Ves,
                    vec![CartLine::new(s.harina, 3, Money::from_cents(150))],
                ),
            )
            .await
            .unwrap();

        assert_eq!(s.db.sales().get_sale(id).await.unwrap().state, DocState::Registered);
        assert_eq!(s.db.kardex().current_stock(s.harina).await.unwrap(), 7);
        assert!(s.db.audit().by_record(&session, "sales", id).await.unwrap().is_empty());
    }
}
