//! # Exchange-rate Registry
//!
//! Manually captured rates, one row per capture. Nothing is ever updated:
//! the newest row for a currency is the current rate.
//!
//! ```text
//!   USD ── 36.50 (BCV, 08:00) ── 36.72 (BCV, 13:00) ◄── latest_rate(USD)
//!   EUR ── 39.90 (BCV, 08:00)                       ◄── latest_rate(EUR)
//!   VES ── always 1.0, never stored
//! ```

use chrono::Duration;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use bodega_core::validation::{validate_optional_text, validate_rate, validate_text};
use bodega_core::{
    AuditAction, CoreError, Currency, ExchangeRate, PermissionChecker, PermissionToken, Session,
    ValidationError, BASE_CURRENCY,
};

use crate::error::DbResult;
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};

const RATE_SELECT: &str = r#"
    SELECT id, source_ccy, target_ccy, rate, source_kind, note, captured_at, captured_by
    FROM exchange_rates
"#;

#[derive(Debug, Clone)]
pub struct RateRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl RateRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        RateRepository { pool, ctx }
    }

    /// Newest row for `ccy` as seen by the caller's transaction.
    ///
    /// Ties on `captured_at` are broken by the later insert.
    pub(crate) async fn latest_in(
        conn: &mut SqliteConnection,
        ccy: Currency,
    ) -> DbResult<Option<ExchangeRate>> {
        let sql = format!(
            "{} WHERE source_ccy = ?1 ORDER BY captured_at DESC, id DESC LIMIT 1",
            RATE_SELECT
        );
        let rate = sqlx::query_as::<_, ExchangeRate>(&sql)
            .bind(ccy)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(rate)
    }

    /// Base units per unit of `ccy` to snapshot into a sale.
    ///
    /// The base currency is always 1.0; any other currency without a
    /// recorded rate is `RATE_UNAVAILABLE`.
    pub(crate) async fn snapshot_in(conn: &mut SqliteConnection, ccy: Currency) -> DbResult<f64> {
        if ccy.is_base() {
            return Ok(1.0);
        }
        match Self::latest_in(conn, ccy).await? {
            Some(rate) => Ok(rate.rate),
            None => Err(CoreError::RateUnavailable {
                currency: ccy.code().to_string(),
            }
            .into()),
        }
    }

    /// Most recent rate for `ccy`, `None` when nothing has been captured.
    pub async fn latest_rate(&self, ccy: Currency) -> DbResult<Option<ExchangeRate>> {
        let mut conn = self.pool.acquire().await?;
        Self::latest_in(&mut conn, ccy).await
    }

    /// Appends a rate captured by the session's worker.
    ///
    /// `source_kind` names where the figure came from (`BCV`, `PARALELO`...).
    /// Requires `articulos_editar`; emits a `MODIFY_RATE` audit entry.
    pub async fn record_rate(
        &self,
        session: &Session,
        source_kind: &str,
        ccy: Currency,
        rate: f64,
        note: Option<&str>,
    ) -> DbResult<i64> {
        session.require_permission(PermissionToken::ArticulosEditar)?;

        if ccy == BASE_CURRENCY {
            return Err(ValidationError::NotAllowed {
                field: "source_ccy".to_string(),
                allowed: vec!["USD".into(), "EUR".into()],
            }
            .into());
        }
        validate_rate(rate)?;
        let source_kind = validate_text("source_kind", source_kind, 30)?;
        let note = validate_optional_text("note", note, 256)?;

        let captured_at = self.ctx.now();
        debug!(ccy = %ccy, rate, source = %source_kind, "Recording exchange rate");

        let id = sqlx::query(
            r#"
            INSERT INTO exchange_rates (source_ccy, target_ccy, rate, source_kind, note, captured_at, captured_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(ccy)
        .bind(BASE_CURRENCY)
        .bind(rate)
        .bind(&source_kind)
        .bind(&note)
        .bind(captured_at)
        .bind(&session.display_name)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let recorded = ExchangeRate {
            id,
            source_ccy: ccy,
            target_ccy: BASE_CURRENCY,
            rate,
            source_kind,
            note,
            captured_at,
            captured_by: session.display_name.clone(),
        };

        info!(id, ccy = %ccy, rate, "Exchange rate recorded");

        AuditLog::new(self.pool.clone(), self.ctx.clone())
            .record_best_effort(
                AuditEvent::new(AuditAction::ModifyRate, "exchange_rates", id)
                    .by(session)
                    .after(&recorded),
            )
            .await;

        Ok(id)
    }

    /// Rates for `ccy` captured within the last `days` days, newest first.
    pub async fn history(&self, ccy: Currency, days: u32) -> DbResult<Vec<ExchangeRate>> {
        let since = self.ctx.now() - Duration::days(i64::from(days));
        let sql = format!(
            "{} WHERE source_ccy = ?1 AND captured_at >= ?2 ORDER BY captured_at DESC, id DESC",
            RATE_SELECT
        );

        let rates = sqlx::query_as::<_, ExchangeRate>(&sql)
            .bind(ccy)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use bodega_core::{ErrorKind, ManualClock, PermissionSet};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn editor() -> Session {
        Session::new(
            1,
            "Ana Pérez",
            "ana",
            1,
            PermissionSet::from_names(["articulos_editar", "usuarios_ver"]),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_latest_rate_wins() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let db = Database::with_clock(DbConfig::in_memory(), Arc::new(clock.clone()))
            .await
            .unwrap();
        let rates = db.rates();

        assert!(rates.latest_rate(Currency::Usd).await.unwrap().is_none());

        rates.record_rate(&editor(), "BCV", Currency::Usd, 36.5, None).await.unwrap();
        clock.advance(Duration::hours(1));
        rates
            .record_rate(&editor(), "BCV", Currency::Usd, 36.72, Some("tarde"))
            .await
            .unwrap();
        rates.record_rate(&editor(), "BCV", Currency::Eur, 39.9, None).await.unwrap();

        let usd = rates.latest_rate(Currency::Usd).await.unwrap().unwrap();
        assert_eq!(usd.rate, 36.72);
        assert_eq!(usd.target_ccy, Currency::Ves);
        assert_eq!(usd.captured_by, "Ana Pérez");

        assert_eq!(rates.history(Currency::Usd, 7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_history_window() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let db = Database::with_clock(DbConfig::in_memory(), Arc::new(clock.clone()))
            .await
            .unwrap();
        let rates = db.rates();

        rates.record_rate(&editor(), "BCV", Currency::Eur, 39.0, None).await.unwrap();
        clock.advance(Duration::days(10));
        rates.record_rate(&editor(), "BCV", Currency::Eur, 41.0, None).await.unwrap();

        let recent = rates.history(Currency::Eur, 7).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].rate, 41.0);
    }

    #[tokio::test]
    async fn test_rejects_bad_rates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let rates = db.rates();

        for bad in [0.0, -1.0, f64::NAN] {
            let err = rates
                .record_rate(&editor(), "BCV", Currency::Usd, bad, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }

        let err = rates
            .record_rate(&editor(), "BCV", Currency::Ves, 1.0, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        // smallest positive double is accepted
        rates
            .record_rate(&editor(), "BCV", Currency::Usd, f64::MIN_POSITIVE, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_requires_permission_and_audits() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cashier = Session::new(2, "Luis Díaz", "luis", 2, PermissionSet::new(), Utc::now());

        let err = db
            .rates()
            .record_rate(&cashier, "BCV", Currency::Usd, 36.0, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let id = db
            .rates()
            .record_rate(&editor(), "BCV", Currency::Usd, 36.0, None)
            .await
            .unwrap();
        let trail = db.audit().by_record(&editor(), "exchange_rates", id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::ModifyRate);
    }
}
