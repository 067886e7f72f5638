//! # Article Repository
//!
//! Article master data. Stock is never stored on the article: it is read
//! from the head of the article's kardex.
//!
//! ## Search
//! ```text
//!   search("har", 20)
//!     ├── ""     → first `limit` articles by name
//!     └── term   → code / name / barcode LIKE %term% (case-insensitive),
//!                  exact code matches first
//! ```

use sqlx::SqlitePool;
use tracing::{debug, info};

use bodega_core::inputs::ArticleInput;
use bodega_core::{
    Article, ArticleStock, AuditAction, CoreError, PermissionChecker, PermissionToken, Session,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::kardex::KardexRepository;
use crate::repository::{count_refs, row_exists};

const ARTICLE_SELECT: &str = r#"
    SELECT id, code, name, description, category_id, presentation_id, sale_price_cents,
           reference_price_cents, is_weighed, price_per_kg_cents, plu, barcode, image,
           created_at, updated_at
    FROM articles
"#;

/// Escapes LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[derive(Debug, Clone)]
pub struct ArticleRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl ArticleRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        ArticleRepository { pool, ctx }
    }

    async fn ensure_refs(&self, input: &ArticleInput) -> DbResult<()> {
        if !row_exists(&self.pool, "categories", input.category_id).await? {
            return Err(DbError::not_found("Category", input.category_id));
        }
        if !row_exists(&self.pool, "presentations", input.presentation_id).await? {
            return Err(DbError::not_found("Presentation", input.presentation_id));
        }
        Ok(())
    }

    /// Creates an article. Its stock starts at zero.
    ///
    /// ## Errors
    /// - `INVALID_ARGUMENT` for any field contract
    /// - `NOT_FOUND` for an unknown category or presentation
    /// - `CONFLICT` when the code is taken
    pub async fn create_article(&self, session: &Session, input: ArticleInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::ArticulosCrear)?;
        let input = input.validate()?;
        self.ensure_refs(&input).await?;

        let now = self.ctx.now();
        debug!(code = %input.code, "Creating article");

        let id = sqlx::query(
            r#"
            INSERT INTO articles (
                code, name, description, category_id, presentation_id, sale_price_cents,
                reference_price_cents, is_weighed, price_per_kg_cents, plu, barcode, image,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
        )
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.presentation_id)
        .bind(input.sale_price_cents)
        .bind(input.reference_price_cents)
        .bind(input.is_weighed)
        .bind(input.price_per_kg_cents)
        .bind(&input.plu)
        .bind(&input.barcode)
        .bind(&input.image)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from(e).with_duplicate_key("Article", format!("code {}", input.code))
        })?
        .last_insert_rowid();

        info!(article_id = id, code = %input.code, "Article created");

        let created = self.get_article(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "articles", id)
                    .by(session)
                    .after(&created),
            )
            .await;

        Ok(id)
    }

    pub async fn update_article(
        &self,
        session: &Session,
        id: i64,
        input: ArticleInput,
    ) -> DbResult<Article> {
        session.require_permission(PermissionToken::ArticulosEditar)?;
        let input = input.validate()?;
        let before = self.get_article(id).await?;
        self.ensure_refs(&input).await?;

        sqlx::query(
            r#"
            UPDATE articles SET
                code = ?2, name = ?3, description = ?4, category_id = ?5, presentation_id = ?6,
                sale_price_cents = ?7, reference_price_cents = ?8, is_weighed = ?9,
                price_per_kg_cents = ?10, plu = ?11, barcode = ?12, image = ?13, updated_at = ?14
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.presentation_id)
        .bind(input.sale_price_cents)
        .bind(input.reference_price_cents)
        .bind(input.is_weighed)
        .bind(input.price_per_kg_cents)
        .bind(&input.plu)
        .bind(&input.barcode)
        .bind(&input.image)
        .bind(self.ctx.now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from(e).with_duplicate_key("Article", format!("code {}", input.code))
        })?;

        let after = self.get_article(id).await?;
        info!(article_id = id, "Article updated");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "articles", id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// Deletes an article that never moved.
    ///
    /// ## Errors
    /// - `STATE_FORBIDDEN` once the article has any kardex entry
    pub async fn delete_article(&self, session: &Session, id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::ArticulosEliminar)?;
        let before = self.get_article(id).await?;

        let movements = count_refs(&self.pool, "kardex", "article_id", id).await?;
        if movements > 0 {
            return Err(CoreError::forbidden(
                "Article",
                id,
                format!("{} kardex entries reference it", movements),
            )
            .into());
        }

        sqlx::query("DELETE FROM articles WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(article_id = id, code = %before.code, "Article deleted");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Delete, "articles", id)
                    .by(session)
                    .before(&before),
            )
            .await;

        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_article(&self, id: i64) -> DbResult<Article> {
        let sql = format!("{} WHERE id = ?1", ARTICLE_SELECT);
        sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Article", id))
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Article>> {
        let sql = format!("{} WHERE code = ?1", ARTICLE_SELECT);
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    pub async fn search(&self, term: &str, limit: u32) -> DbResult<Vec<Article>> {
        let term = term.trim();
        debug!(term = %term, limit, "Searching articles");

        let articles = if term.is_empty() {
            let sql = format!("{} ORDER BY name COLLATE NOCASE LIMIT ?1", ARTICLE_SELECT);
            sqlx::query_as::<_, Article>(&sql)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                r#"{} WHERE code LIKE ?1 ESCAPE '\' OR name LIKE ?1 ESCAPE '\'
                         OR barcode LIKE ?1 ESCAPE '\'
                   ORDER BY (code = ?2 COLLATE NOCASE) DESC, name COLLATE NOCASE
                   LIMIT ?3"#,
                ARTICLE_SELECT
            );
            sqlx::query_as::<_, Article>(&sql)
                .bind(like_pattern(term))
                .bind(term)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
        };

        debug!(count = articles.len(), "Search returned articles");
        Ok(articles)
    }

    /// Every article with its current stock and level, by code.
    pub async fn list_with_stock(&self, session: &Session) -> DbResult<Vec<ArticleStock>> {
        session.require_permission(PermissionToken::ArticulosVer)?;
        KardexRepository::new(self.pool.clone(), self.ctx.clone())
            .all_with_stock()
            .await
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}
