//! # Category and Presentation Repositories
//!
//! Article classification. Names are unique ignoring case.
//!
//! ```text
//!   Category (Víveres, Limpieza, ...) ──┐
//!                                       ├──► Article
//!   Presentation (Unidad, Kg, Caja) ────┘
//! ```
//!
//! A category cannot be deleted while an article references it.

use sqlx::SqlitePool;
use tracing::{debug, info};

use bodega_core::inputs::CategoryInput;
use bodega_core::validation::validate_text;
use bodega_core::{
    AuditAction, Category, CoreError, PermissionChecker, PermissionToken, Presentation, Session,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::count_refs;

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        CategoryRepository { pool, ctx }
    }

    async fn fetch(&self, id: i64) -> DbResult<Category> {
        sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Category", id))
    }

    pub async fn create_category(&self, session: &Session, input: CategoryInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::ArticulosCrear)?;
        let input = input.validate()?;

        debug!(name = %input.name, "Creating category");

        let id = sqlx::query("INSERT INTO categories (name, description) VALUES (?1, ?2)")
            .bind(&input.name)
            .bind(&input.description)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).with_duplicate_key("Category", input.name.clone()))?
            .last_insert_rowid();

        info!(category_id = id, name = %input.name, "Category created");

        let created = Category {
            id,
            name: input.name,
            description: input.description,
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "categories", id)
                    .by(session)
                    .after(&created),
            )
            .await;

        Ok(id)
    }

    pub async fn update_category(
        &self,
        session: &Session,
        id: i64,
        input: CategoryInput,
    ) -> DbResult<Category> {
        session.require_permission(PermissionToken::ArticulosEditar)?;
        let input = input.validate()?;
        let before = self.fetch(id).await?;

        sqlx::query("UPDATE categories SET name = ?2, description = ?3 WHERE id = ?1")
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).with_duplicate_key("Category", input.name.clone()))?;

        let after = Category {
            id,
            name: input.name,
            description: input.description,
        };
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "categories", id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// ## Errors
    /// - `STATE_FORBIDDEN` while any article belongs to the category
    pub async fn delete_category(&self, session: &Session, id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::ArticulosEliminar)?;
        let before = self.fetch(id).await?;

        let in_use = count_refs(&self.pool, "articles", "category_id", id).await?;
        if in_use > 0 {
            return Err(CoreError::forbidden(
                "Category",
                id,
                format!("{} articles belong to it", in_use),
            )
            .into());
        }

        sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(category_id = id, "Category deleted");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Delete, "categories", id)
                    .by(session)
                    .before(&before),
            )
            .await;

        Ok(())
    }

    pub async fn get_category(&self, id: i64) -> DbResult<Category> {
        self.fetch(id).await
    }

    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, description FROM categories ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}

// =============================================================================
// Presentations
// =============================================================================

#[derive(Debug, Clone)]
pub struct PresentationRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl PresentationRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        PresentationRepository { pool, ctx }
    }

    pub async fn create_presentation(&self, session: &Session, name: &str) -> DbResult<i64> {
        session.require_permission(PermissionToken::ArticulosCrear)?;
        let name = validate_text("name", name, 50)?;

        let id = sqlx::query("INSERT INTO presentations (name) VALUES (?1)")
            .bind(&name)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from(e).with_duplicate_key("Presentation", name.clone()))?
            .last_insert_rowid();

        info!(presentation_id = id, name = %name, "Presentation created");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "presentations", id)
                    .by(session)
                    .after(&Presentation { id, name }),
            )
            .await;

        Ok(id)
    }

    pub async fn list_presentations(&self) -> DbResult<Vec<Presentation>> {
        let rows = sqlx::query_as::<_, Presentation>(
            "SELECT id, name FROM presentations ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}
