//! # Repository Module
//!
//! Store repository implementations for Bodega POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Front-end call                                                        │
//! │       │                                                                 │
//! │       │  db.sales().record_sale(&session, input)                       │
//! │       ▼                                                                 │
//! │  SaleRepository                                                        │
//! │  ├── require_permission(VentasCrear)                                   │
//! │  ├── validate input (bodega-core)                                      │
//! │  ├── BEGIN ... lock articles, check stock, post kardex ... COMMIT      │
//! │  └── audit (own statement, best effort)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! | Handle | Concern |
//! |---|---|
//! | [`kardex::KardexRepository`] | per-article ledger, stock levels |
//! | [`incoming::IncomingRepository`] | supplier deliveries |
//! | [`sale::SaleRepository`] | sale documents and totals |
//! | [`rate::RateRepository`] | exchange-rate registry |
//! | [`audit::AuditLog`] | append-only audit trail |
//! | [`worker::WorkerRepository`] | workers, `WorkerLookup` |
//! | [`role::RoleRepository`] | roles, permission catalog |
//! | [`auth::AuthService`] | login, sessions, reset tokens |
//! | [`category`], [`article`], [`supplier`], [`client`] | catalog |
//! | [`report::ReportRepository`] | sales reports |

pub mod article;
pub mod audit;
pub mod auth;
pub mod category;
pub mod client;
pub mod incoming;
pub mod kardex;
pub mod rate;
pub mod report;
pub mod role;
pub mod sale;
pub mod supplier;
pub mod worker;

#[cfg(test)]
pub(crate) mod fixtures;

use sqlx::SqliteExecutor;

use crate::error::DbResult;

/// True when `table` has a row with `id`. `table` is always a literal.
pub(crate) async fn row_exists<'e, E>(executor: E, table: &'static str, id: i64) -> DbResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    let found: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(executor).await?;
    Ok(found)
}

/// Counts rows of `table` whose `column` equals `id`.
pub(crate) async fn count_refs<'e, E>(
    executor: E,
    table: &'static str,
    column: &'static str,
    id: i64,
) -> DbResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table, column);
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(executor).await?;
    Ok(count)
}
