//! # Supplier Repository
//!
//! Suppliers and the files attached to them (price lists, invoices, photos).
//!
//! ## Attachments
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  upload_blob(supplier, "lista.pdf", bytes)                             │
//! │    ├── extension → MIME (jpg png gif pdf xls xlsx csv txt ...)         │
//! │    ├── 0 < size ≤ 10 MiB                                               │
//! │    └── INSERT supplier_blobs, UPLOAD audit                             │
//! │                                                                         │
//! │  list_blobs      → metadata only, bytes stay in the store              │
//! │  download_blob   → metadata + bytes, DOWNLOAD audit                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A supplier referenced by any incoming document cannot be deleted; its
//! attachments go with it otherwise.

use sqlx::SqlitePool;
use tracing::{debug, info};

use bodega_core::inputs::SupplierInput;
use bodega_core::validation::{validate_attachment, validate_optional_text};
use bodega_core::{
    AuditAction, CoreError, PermissionChecker, PermissionToken, Session, Supplier, SupplierBlob,
    SupplierBlobMeta,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::{count_refs, row_exists};

const SUPPLIER_SELECT: &str = r#"
    SELECT id, trade_name, sector, doc_type, doc_number, contact_name, phone, email, address
    FROM suppliers
"#;

const BLOB_META_SELECT: &str = r#"
    SELECT id, supplier_id, filename, mime, size, description, uploaded_at
    FROM supplier_blobs
"#;

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        SupplierRepository { pool, ctx }
    }

    pub async fn create_supplier(&self, session: &Session, input: SupplierInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::ProveedoresCrear)?;
        let input = input.validate()?;

        debug!(doc_number = %input.doc_number, "Creating supplier");

        let id = sqlx::query(
            r#"
            INSERT INTO suppliers (trade_name, sector, doc_type, doc_number, contact_name,
                                   phone, email, address)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&input.trade_name)
        .bind(&input.sector)
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(&input.contact_name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let key = format!("document {}", input.doc_number);
            DbError::from(e).with_duplicate_key("Supplier", key)
        })?
        .last_insert_rowid();

        info!(supplier_id = id, trade_name = %input.trade_name, "Supplier created");

        let created = self.get_supplier(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "suppliers", id)
                    .by(session)
                    .after(&created),
            )
            .await;

        Ok(id)
    }

    pub async fn update_supplier(
        &self,
        session: &Session,
        id: i64,
        input: SupplierInput,
    ) -> DbResult<Supplier> {
        session.require_permission(PermissionToken::ProveedoresEditar)?;
        let input = input.validate()?;
        let before = self.get_supplier(id).await?;

        sqlx::query(
            r#"
            UPDATE suppliers SET
                trade_name = ?2, sector = ?3, doc_type = ?4, doc_number = ?5,
                contact_name = ?6, phone = ?7, email = ?8, address = ?9
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.trade_name)
        .bind(&input.sector)
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(&input.contact_name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let key = format!("document {}", input.doc_number);
            DbError::from(e).with_duplicate_key("Supplier", key)
        })?;

        let after = self.get_supplier(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "suppliers", id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// ## Errors
    /// - `STATE_FORBIDDEN` while incoming documents reference the supplier
    pub async fn delete_supplier(&self, session: &Session, id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::ProveedoresEliminar)?;
        let before = self.get_supplier(id).await?;

        let deliveries = count_refs(&self.pool, "incoming_docs", "supplier_id", id).await?;
        if deliveries > 0 {
            return Err(CoreError::forbidden(
                "Supplier",
                id,
                format!("{} incoming documents reference it", deliveries),
            )
            .into());
        }

        sqlx::query("DELETE FROM suppliers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(supplier_id = id, "Supplier deleted");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Delete, "suppliers", id)
                    .by(session)
                    .before(&before),
            )
            .await;

        Ok(())
    }

    pub async fn get_supplier(&self, id: i64) -> DbResult<Supplier> {
        let sql = format!("{} WHERE id = ?1", SUPPLIER_SELECT);
        sqlx::query_as::<_, Supplier>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))
    }

    pub async fn list_suppliers(&self, session: &Session) -> DbResult<Vec<Supplier>> {
        session.require_permission(PermissionToken::ProveedoresVer)?;
        let sql = format!("{} ORDER BY trade_name COLLATE NOCASE", SUPPLIER_SELECT);
        let rows = sqlx::query_as::<_, Supplier>(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Trade name, sector or document number containing `term`.
    pub async fn search_suppliers(&self, session: &Session, term: &str) -> DbResult<Vec<Supplier>> {
        session.require_permission(PermissionToken::ProveedoresVer)?;
        let term = term.trim();
        if term.is_empty() {
            return self.list_suppliers(session).await;
        }

        let sql = format!(
            r#"{} WHERE trade_name LIKE ?1 OR sector LIKE ?1 OR doc_number LIKE ?1
               ORDER BY trade_name COLLATE NOCASE"#,
            SUPPLIER_SELECT
        );
        let rows = sqlx::query_as::<_, Supplier>(&sql)
            .bind(format!("%{}%", term))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Stores a file against a supplier and returns the attachment id.
    ///
    /// ## Errors
    /// - `INVALID_ARGUMENT` for an extension outside the allowed list, an
    ///   empty file or one over 10 MiB
    /// - `NOT_FOUND` for an unknown supplier
    pub async fn upload_blob(
        &self,
        session: &Session,
        supplier_id: i64,
        filename: &str,
        bytes: &[u8],
        description: Option<&str>,
    ) -> DbResult<i64> {
        session.require_permission(PermissionToken::ProveedoresEditar)?;
        let mime = validate_attachment(filename, bytes.len())?;
        let description = validate_optional_text("description", description, 256)?;

        if !row_exists(&self.pool, "suppliers", supplier_id).await? {
            return Err(DbError::not_found("Supplier", supplier_id));
        }

        let id = sqlx::query(
            r#"
            INSERT INTO supplier_blobs (supplier_id, filename, mime, size, bytes, description, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(supplier_id)
        .bind(filename.trim())
        .bind(mime)
        .bind(bytes.len() as i64)
        .bind(bytes)
        .bind(&description)
        .bind(self.ctx.now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        info!(supplier_id, blob_id = id, size = bytes.len(), mime, "Attachment uploaded");

        let meta = self.blob_meta(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Upload, "supplier_blobs", id)
                    .by(session)
                    .after(&meta),
            )
            .await;

        Ok(id)
    }

    async fn blob_meta(&self, blob_id: i64) -> DbResult<SupplierBlobMeta> {
        let sql = format!("{} WHERE id = ?1", BLOB_META_SELECT);
        sqlx::query_as::<_, SupplierBlobMeta>(&sql)
            .bind(blob_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("SupplierBlob", blob_id))
    }

    pub async fn download_blob(&self, session: &Session, blob_id: i64) -> DbResult<SupplierBlob> {
        session.require_permission(PermissionToken::ProveedoresVer)?;
        let meta = self.blob_meta(blob_id).await?;

        let bytes: Vec<u8> = sqlx::query_scalar("SELECT bytes FROM supplier_blobs WHERE id = ?1")
            .bind(blob_id)
            .fetch_one(&self.pool)
            .await?;

        debug!(blob_id, size = bytes.len(), "Attachment downloaded");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Download, "supplier_blobs", blob_id)
                    .by(session)
                    .after(&meta),
            )
            .await;

        Ok(SupplierBlob { meta, bytes })
    }

    /// Attachment metadata for a supplier, newest first.
    pub async fn list_blobs(
        &self,
        session: &Session,
        supplier_id: i64,
    ) -> DbResult<Vec<SupplierBlobMeta>> {
        session.require_permission(PermissionToken::ProveedoresVer)?;
        let sql = format!(
            "{} WHERE supplier_id = ?1 ORDER BY uploaded_at DESC, id DESC",
            BLOB_META_SELECT
        );
        let rows = sqlx::query_as::<_, SupplierBlobMeta>(&sql)
            .bind(supplier_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn delete_blob(&self, session: &Session, blob_id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::ProveedoresEliminar)?;
        let meta = self.blob_meta(blob_id).await?;

        sqlx::query("DELETE FROM supplier_blobs WHERE id = ?1")
            .bind(blob_id)
            .execute(&self.pool)
            .await?;

        info!(blob_id, supplier_id = meta.supplier_id, "Attachment deleted");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Delete, "supplier_blobs", blob_id)
                    .by(session)
                    .before(&meta),
            )
            .await;

        Ok(())
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::*;
    use bodega_core::{ErrorKind, IdDocType, MAX_BLOB_SIZE};

    fn polar() -> SupplierInput {
        SupplierInput {
            trade_name: "Alimentos Polar".into(),
            sector: "Alimentos".into(),
            doc_type: IdDocType::Rif,
            doc_number: "j-00006372-9".into(),
            contact_name: Some("Luis Méndez".into()),
            phone: Some("0212-202-3111".into()),
            email: Some("ventas@polar.com.ve".into()),
            address: None,
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicate() {
        let db = memory_db().await;
        let admin = admin_session(0);

        let id = db.suppliers().create_supplier(&admin, polar()).await.unwrap();
        let supplier = db.suppliers().get_supplier(id).await.unwrap();
        assert_eq!(supplier.doc_number, "J000063729");
        assert_eq!(supplier.phone.as_deref(), Some("02122023111"));

        let err = db.suppliers().create_supplier(&admin, polar()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut bad = polar();
        bad.doc_number = "V12".into();
        let err = db.suppliers().create_supplier(&admin, bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_search_and_update() {
        let db = memory_db().await;
        let admin = admin_session(0);
        let id = db.suppliers().create_supplier(&admin, polar()).await.unwrap();
        insert_supplier(&db, "J123456789").await;

        assert_eq!(db.suppliers().search_suppliers(&admin, "polar").await.unwrap().len(), 2);
        assert_eq!(db.suppliers().search_suppliers(&admin, "000063729").await.unwrap().len(), 1);

        let mut input = polar();
        input.sector = "Bebidas".into();
        let updated = db.suppliers().update_supplier(&admin, id, input).await.unwrap();
        assert_eq!(updated.sector, "Bebidas");
    }

    #[tokio::test]
    async fn test_blob_lifecycle() {
        let db = memory_db().await;
        let admin = admin_session(0);
        let supplier = insert_supplier(&db, "J123456789").await;
        let repo = db.suppliers();

        let pdf = b"%PDF-1.4 lista de precios".to_vec();
        let id = repo
            .upload_blob(&admin, supplier, "Lista-Mayo.PDF", &pdf, Some("precios de mayo"))
            .await
            .unwrap();

        let metas = repo.list_blobs(&admin, supplier).await.unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].mime, "application/pdf");
        assert_eq!(metas[0].size, pdf.len() as i64);

        let blob = repo.download_blob(&admin, id).await.unwrap();
        assert_eq!(blob.bytes, pdf);

        let trail = db.audit().by_record(&admin, "supplier_blobs", id).await.unwrap();
        let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
        assert!(actions.contains(&AuditAction::Upload));
        assert!(actions.contains(&AuditAction::Download));

        repo.delete_blob(&admin, id).await.unwrap();
        assert!(repo.list_blobs(&admin, supplier).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_contracts() {
        let db = memory_db().await;
        let admin = admin_session(0);
        let supplier = insert_supplier(&db, "J123456789").await;
        let repo = db.suppliers();

        let err = repo.upload_blob(&admin, supplier, "virus.exe", b"MZ", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = repo.upload_blob(&admin, supplier, "vacio.txt", b"", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let big = vec![0u8; MAX_BLOB_SIZE + 1];
        let err = repo.upload_blob(&admin, supplier, "foto.png", &big, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = repo.upload_blob(&admin, 999, "foto.png", b"png", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let viewer = session_with(0, &["proveedores_ver"]);
        let err = repo.upload_blob(&viewer, supplier, "foto.png", b"png", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_delete_refused_with_deliveries() {
        let db = memory_db().await;
        let admin = admin_session(0);
        let supplier = insert_supplier(&db, "J123456789").await;
        let role = insert_role(&db, "Almacén").await;
        let worker = insert_worker(&db, role, "pedro").await;
        sqlx::query(
            r#"INSERT INTO incoming_docs (supplier_id, worker_id, ts, doc_type, series, number, vat_pct)
               VALUES (?1, ?2, '2024-05-01T12:00:00+00:00', 'FACTURA', 'A', '1', 16)"#,
        )
        .bind(supplier)
        .bind(worker)
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.suppliers().delete_supplier(&admin, supplier).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateForbidden);

        let other = insert_supplier(&db, "J987654321").await;
        db.suppliers().delete_supplier(&admin, other).await.unwrap();
    }
}
