//! # Sales Reports
//!
//! Read-only aggregation over sale documents.
//!
//! ## Bucketing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sales_in_range(2024-05-01, 2024-05-31)                                │
//! │                                                                         │
//! │  sale #1  VES  Bs 100.00 ──┐                                           │
//! │  sale #2  USD  $    5.00 ──┼──► sum_by_ccy { VES 100.00, USD 5.00,     │
//! │  sale #3  VOIDED  ✗        │                 EUR 0.00 }                │
//! │                            └──► per_day["2024-05-01"] { count 2, ... } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - Voided sales are left out
//! - A sale counts in its payment currency only; base equivalents are not
//!   summed again
//! - Days are the local business date of the sale

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use bodega_core::cart::SaleCart;
use bodega_core::{
    AuditAction, Currency, Money, PermissionChecker, PermissionToken, SaleDoc, SaleLine, Session,
    ValidationError,
};

use crate::error::DbResult;
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};

/// Zero in every currency, so all three keys are always present.
fn empty_sums() -> BTreeMap<Currency, Money> {
    Currency::ALL.iter().map(|c| (*c, Money::zero())).collect()
}

fn add_to(sums: &mut BTreeMap<Currency, Money>, ccy: Currency, amount: Money) -> DbResult<()> {
    let slot = sums.entry(ccy).or_default();
    *slot = slot
        .checked_add(amount)
        .ok_or_else(|| ValidationError::overflow("report total"))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    pub count: i64,
    pub sum_by_ccy: BTreeMap<Currency, Money>,
}

impl Default for DayBucket {
    fn default() -> Self {
        DayBucket {
            count: 0,
            sum_by_ccy: empty_sums(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_count: i64,
    pub sum_by_ccy: BTreeMap<Currency, Money>,
    pub per_day: BTreeMap<NaiveDate, DayBucket>,
}

/// Quantity sold of one article over a range.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TopArticle {
    pub article_id: i64,
    pub code: String,
    pub name: String,
    pub qty_sold: i64,
}

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        ReportRepository { pool, ctx }
    }

    fn check_range(start: NaiveDate, end: NaiveDate) -> DbResult<()> {
        if start > end {
            return Err(
                ValidationError::invalid_format("range", "start date is after end date").into(),
            );
        }
        Ok(())
    }

    /// Sales totals between two local dates, both inclusive.
    ///
    /// ## Errors
    /// - `PERMISSION_DENIED` without `reportes_ventas`
    /// - `INVALID_ARGUMENT` when `start > end`
    pub async fn sales_in_range(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> DbResult<SalesReport> {
        session.require_permission(PermissionToken::ReportesVentas)?;
        Self::check_range(start, end)?;

        debug!(%start, %end, "Building sales report");

        let sales = sqlx::query_as::<_, SaleDoc>(
            r#"
            SELECT id, client_id, worker_id, ts, sale_date, doc_type, series, number,
                   vat_pct, state, payment_ccy, sale_ccy, snapshot_rate
            FROM sales
            WHERE sale_date >= ?1 AND sale_date <= ?2 AND state != 'VOIDED'
            ORDER BY ts, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT l.id, l.sale_id, l.article_id, l.qty, l.unit_price_cents
            FROM sale_lines l
            JOIN sales s ON s.id = l.sale_id
            WHERE s.sale_date >= ?1 AND s.sale_date <= ?2 AND s.state != 'VOIDED'
            ORDER BY l.sale_id, l.id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut lines_by_sale: HashMap<i64, Vec<SaleLine>> = HashMap::new();
        for line in lines {
            lines_by_sale.entry(line.sale_id).or_default().push(line);
        }

        let mut report = SalesReport {
            start,
            end,
            total_count: 0,
            sum_by_ccy: empty_sums(),
            per_day: BTreeMap::new(),
        };

        for sale in &sales {
            let sale_lines = lines_by_sale.get(&sale.id).map(Vec::as_slice).unwrap_or(&[]);
            let total = SaleCart::from_lines(sale.vat_pct, sale_lines)
                .totals(sale.snapshot_rate)?
                .total_sale_ccy;

            report.total_count += 1;
            add_to(&mut report.sum_by_ccy, sale.payment_ccy, total)?;

            let day = report.per_day.entry(sale.sale_date).or_default();
            day.count += 1;
            add_to(&mut day.sum_by_ccy, sale.payment_ccy, total)?;
        }

        info!(%start, %end, sales = report.total_count, "Sales report built");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Consult, "sales", 0)
                    .by(session)
                    .after(&serde_json::json!({
                        "report": "sales_in_range",
                        "start": start,
                        "end": end,
                    })),
            )
            .await;

        Ok(report)
    }

    /// Articles by quantity sold over non-voided sales, most sold first.
    pub async fn top_articles(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
        limit: u32,
    ) -> DbResult<Vec<TopArticle>> {
        session.require_permission(PermissionToken::ReportesVentas)?;
        Self::check_range(start, end)?;

        let rows = sqlx::query_as::<_, TopArticle>(
            r#"
            SELECT a.id AS article_id, a.code, a.name, SUM(l.qty) AS qty_sold
            FROM sale_lines l
            JOIN sales s ON s.id = l.sale_id
            JOIN articles a ON a.id = l.article_id
            WHERE s.sale_date >= ?1 AND s.sale_date <= ?2 AND s.state != 'VOIDED'
            GROUP BY a.id, a.code, a.name
            ORDER BY qty_sold DESC, a.code
            LIMIT ?3
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}
