//! # Kardex Repository
//!
//! The per-article movement ledger. It is the only source of truth for
//! stock: `current_stock(A)` is the `stock_after` of A's newest entry.
//!
//! ## Posting Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inside the caller's transaction                                       │
//! │                                                                         │
//! │  1. UPDATE articles SET ledger_seq = ledger_seq + 1 WHERE id = A       │
//! │     └── takes SQLite's write lock before anything is read;             │
//! │         a competing poster waits (busy_timeout) or gets CONFLICT_RETRY │
//! │                                                                         │
//! │  2. SELECT seq, stock_after FROM kardex WHERE article_id = A           │
//! │     ORDER BY seq DESC LIMIT 1              (none → seq 0, stock 0)     │
//! │                                                                         │
//! │  3. OUT and qty > stock → STOCK_WOULD_GO_NEGATIVE                      │
//! │                                                                         │
//! │  4. INSERT kardex (A, seq + 1, ..., stock_before, stock_after)         │
//! │     └── UNIQUE(article_id, seq) is the second guard                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are never updated or deleted (enforced by triggers).

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use bodega_core::validation::validate_quantity;
use bodega_core::{
    Article, ArticleStock, CoreError, KardexEntry, Money, MovementKind, PermissionChecker,
    PermissionToken, Session, StockLevel, ValidationError, STOCK_LOW_MAX,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;

/// Repository for the inventory ledger.
#[derive(Debug, Clone)]
pub struct KardexRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

/// One movement to append.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement<'a> {
    pub article_id: i64,
    pub kind: MovementKind,
    pub qty: i64,
    pub ref_doc: &'a str,
    pub unit_price: Option<Money>,
}

#[derive(sqlx::FromRow)]
struct ArticleStockRow {
    #[sqlx(flatten)]
    article: Article,
    current_stock: i64,
}

impl From<ArticleStockRow> for ArticleStock {
    fn from(row: ArticleStockRow) -> Self {
        ArticleStock {
            level: StockLevel::from_stock(row.current_stock),
            current_stock: row.current_stock,
            article: row.article,
        }
    }
}

/// Column list shared by article-with-stock queries.
pub(crate) const ARTICLE_STOCK_SELECT: &str = r#"
    SELECT a.id, a.code, a.name, a.description, a.category_id, a.presentation_id,
           a.sale_price_cents, a.reference_price_cents, a.is_weighed, a.price_per_kg_cents,
           a.plu, a.barcode, a.image, a.created_at, a.updated_at,
           COALESCE((SELECT k.stock_after FROM kardex k
                     WHERE k.article_id = a.id
                     ORDER BY k.seq DESC LIMIT 1), 0) AS current_stock
    FROM articles a
"#;

impl KardexRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        KardexRepository { pool, ctx }
    }

    // =========================================================================
    // Transaction-level primitives
    // =========================================================================

    /// Takes the per-article write lock. Fails with NOT_FOUND when the
    /// article does not exist.
    pub(crate) async fn lock_article(conn: &mut SqliteConnection, article_id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE articles SET ledger_seq = ledger_seq + 1 WHERE id = ?1")
            .bind(article_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Article", article_id));
        }
        Ok(())
    }

    /// `(seq, stock_after)` of the newest entry, `(0, 0)` when none.
    async fn head(conn: &mut SqliteConnection, article_id: i64) -> DbResult<(i64, i64)> {
        let head: Option<(i64, i64)> = sqlx::query_as(
            "SELECT seq, stock_after FROM kardex WHERE article_id = ?1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(article_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(head.unwrap_or((0, 0)))
    }

    /// Stock of an article as seen by the current transaction.
    pub(crate) async fn stock_in(conn: &mut SqliteConnection, article_id: i64) -> DbResult<i64> {
        Ok(Self::head(conn, article_id).await?.1)
    }

    /// Appends one movement inside the caller's transaction.
    pub(crate) async fn post_in(
        conn: &mut SqliteConnection,
        ctx: &StoreContext,
        movement: &Movement<'_>,
    ) -> DbResult<KardexEntry> {
        validate_quantity(movement.qty)?;

        Self::lock_article(conn, movement.article_id).await?;
        let (last_seq, stock_before) = Self::head(conn, movement.article_id).await?;

        if movement.kind == MovementKind::Out && movement.qty > stock_before {
            return Err(CoreError::StockWouldGoNegative {
                article_id: movement.article_id,
                available: stock_before,
                requested: movement.qty,
            }
            .into());
        }

        let stock_after = stock_before
            .checked_add(movement.kind.signed(movement.qty))
            .ok_or_else(|| ValidationError::overflow("stock"))?;
        let total_value_cents = match movement.unit_price {
            Some(price) => price
                .checked_multiply_quantity(movement.qty)
                .ok_or_else(|| ValidationError::overflow("total value"))?
                .cents(),
            None => 0,
        };
        let seq = last_seq + 1;
        let ts = ctx.now();
        let unit_price_cents = movement.unit_price.map(|p| p.cents());

        debug!(
            article_id = movement.article_id,
            seq,
            kind = ?movement.kind,
            qty = movement.qty,
            stock_before,
            stock_after,
            "Posting kardex movement"
        );

        let id = sqlx::query(
            r#"
            INSERT INTO kardex (
                article_id, seq, ts, kind, ref_doc, qty,
                unit_price_cents, total_value_cents, stock_before, stock_after
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(movement.article_id)
        .bind(seq)
        .bind(ts)
        .bind(movement.kind)
        .bind(movement.ref_doc)
        .bind(movement.qty)
        .bind(unit_price_cents)
        .bind(total_value_cents)
        .bind(stock_before)
        .bind(stock_after)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        Ok(KardexEntry {
            id,
            article_id: movement.article_id,
            seq,
            ts,
            kind: movement.kind,
            ref_doc: movement.ref_doc.to_string(),
            qty: movement.qty,
            unit_price_cents,
            total_value_cents,
            stock_before,
            stock_after,
        })
    }

    // =========================================================================
    // Public ledger operations
    // =========================================================================

    /// Current stock of an article (0 when it has no movements).
    pub async fn current_stock(&self, article_id: i64) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        if !super::row_exists(&mut *conn, "articles", article_id).await? {
            return Err(DbError::not_found("Article", article_id));
        }
        Self::stock_in(&mut conn, article_id).await
    }

    /// Posts a single movement in its own transaction and returns the entry id.
    ///
    /// ## Errors
    /// - `INVALID_ARGUMENT` when `qty <= 0` or the stock or value leaves the `i64` range
    /// - `NOT_FOUND` when the article does not exist
    /// - `STOCK_WOULD_GO_NEGATIVE` for an OUT larger than stock
    /// - `CONFLICT_RETRY` when a competing writer holds the lock too long
    pub async fn post_movement(
        &self,
        article_id: i64,
        kind: MovementKind,
        qty: i64,
        ref_doc: &str,
        unit_price: Option<Money>,
    ) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;

        let entry = Self::post_in(
            &mut tx,
            &self.ctx,
            &Movement {
                article_id,
                kind,
                qty,
                ref_doc,
                unit_price,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            article_id,
            entry_id = entry.id,
            stock_after = entry.stock_after,
            "Kardex movement posted"
        );
        Ok(entry.id)
    }

    /// Movements of an article, newest first.
    pub async fn movements(
        &self,
        article_id: i64,
        limit: Option<u32>,
    ) -> DbResult<Vec<KardexEntry>> {
        let limit = limit.map(i64::from).unwrap_or(-1); // -1: no limit in SQLite

        let entries = sqlx::query_as::<_, KardexEntry>(
            r#"
            SELECT id, article_id, seq, ts, kind, ref_doc, qty,
                   unit_price_cents, total_value_cents, stock_before, stock_after
            FROM kardex
            WHERE article_id = ?1
            ORDER BY seq DESC
            LIMIT ?2
            "#,
        )
        .bind(article_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries posted for a source document, in posting order.
    pub async fn entries_for_ref(&self, ref_doc: &str) -> DbResult<Vec<KardexEntry>> {
        let entries = sqlx::query_as::<_, KardexEntry>(
            r#"
            SELECT id, article_id, seq, ts, kind, ref_doc, qty,
                   unit_price_cents, total_value_cents, stock_before, stock_after
            FROM kardex
            WHERE ref_doc = ?1
            ORDER BY id
            "#,
        )
        .bind(ref_doc)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// CRITICAL / LOW / NORMAL for an article.
    pub async fn stock_level(&self, article_id: i64) -> DbResult<StockLevel> {
        Ok(StockLevel::from_stock(self.current_stock(article_id).await?))
    }

    /// Articles at CRITICAL or LOW level, lowest stock first.
    pub async fn low_stock(&self, session: &Session, limit: u32) -> DbResult<Vec<ArticleStock>> {
        session.require_permission(PermissionToken::InventarioVer)?;

        let sql = format!(
            "SELECT * FROM ({}) WHERE current_stock <= ?1 ORDER BY current_stock ASC, code ASC LIMIT ?2",
            ARTICLE_STOCK_SELECT
        );

        let rows = sqlx::query_as::<_, ArticleStockRow>(&sql)
            .bind(STOCK_LOW_MAX)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ArticleStock::from).collect())
    }

    /// Every article with its stock, ordered by code.
    pub(crate) async fn all_with_stock(&self) -> DbResult<Vec<ArticleStock>> {
        let sql = format!("{} ORDER BY a.code", ARTICLE_STOCK_SELECT);
        let rows = sqlx::query_as::<_, ArticleStockRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ArticleStock::from).collect())
    }

    /// Replays the ledger of an article and checks it.
    ///
    /// ## Checks
    /// - seq runs 1, 2, 3, ... without gaps
    /// - each entry's `stock_before` is its predecessor's `stock_after` (0 first)
    /// - each `stock_after` is `stock_before ± qty` and never negative
    /// - the running sum equals `current_stock`
    pub async fn verify_ledger(&self, article_id: i64) -> DbResult<bool> {
        let entries = sqlx::query_as::<_, KardexEntry>(
            r#"
            SELECT id, article_id, seq, ts, kind, ref_doc, qty,
                   unit_price_cents, total_value_cents, stock_before, stock_after
            FROM kardex
            WHERE article_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;

        let mut running = 0i64;
        for (idx, entry) in entries.iter().enumerate() {
            let expected_after = entry.stock_before + entry.kind.signed(entry.qty);
            if entry.seq != idx as i64 + 1
                || entry.stock_before != running
                || entry.stock_after != expected_after
                || entry.stock_after < 0
            {
                return Ok(false);
            }
            running = entry.stock_after;
        }

        Ok(running == self.current_stock(article_id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
