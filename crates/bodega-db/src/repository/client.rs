//! # Client Repository
//!
//! Buyers identified by document (cédula, RIF or passport). A sale may name
//! a client or be anonymous; a client named by any sale cannot be deleted.

use sqlx::SqlitePool;
use tracing::{debug, info};

use bodega_core::inputs::ClientInput;
use bodega_core::validation::validate_doc_number;
use bodega_core::{
    AuditAction, Client, CoreError, IdDocType, PermissionChecker, PermissionToken, Session,
};

use crate::error::{DbError, DbResult};
use crate::pool::StoreContext;
use crate::repository::audit::{AuditEvent, AuditLog};
use crate::repository::count_refs;

const CLIENT_SELECT: &str = r#"
    SELECT id, name, surname, sex, birth_date, doc_type, doc_number, phone, email, address
    FROM clients
"#;

#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
    ctx: StoreContext,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool, ctx: StoreContext) -> Self {
        ClientRepository { pool, ctx }
    }

    pub async fn create_client(&self, session: &Session, input: ClientInput) -> DbResult<i64> {
        session.require_permission(PermissionToken::ClientesCrear)?;
        let input = input.validate()?;

        debug!(doc_number = %input.doc_number, "Creating client");

        let id = sqlx::query(
            r#"
            INSERT INTO clients (name, surname, sex, birth_date, doc_type, doc_number,
                                 phone, email, address)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&input.name)
        .bind(&input.surname)
        .bind(input.sex)
        .bind(input.birth_date)
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from(e).with_duplicate_key("Client", format!("document {}", input.doc_number))
        })?
        .last_insert_rowid();

        info!(client_id = id, "Client created");

        let created = self.get_client(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Create, "clients", id)
                    .by(session)
                    .after(&created),
            )
            .await;

        Ok(id)
    }

    pub async fn update_client(
        &self,
        session: &Session,
        id: i64,
        input: ClientInput,
    ) -> DbResult<Client> {
        session.require_permission(PermissionToken::ClientesEditar)?;
        let input = input.validate()?;
        let before = self.get_client(id).await?;

        sqlx::query(
            r#"
            UPDATE clients SET
                name = ?2, surname = ?3, sex = ?4, birth_date = ?5, doc_type = ?6,
                doc_number = ?7, phone = ?8, email = ?9, address = ?10
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.surname)
        .bind(input.sex)
        .bind(input.birth_date)
        .bind(input.doc_type)
        .bind(&input.doc_number)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DbError::from(e).with_duplicate_key("Client", format!("document {}", input.doc_number))
        })?;

        let after = self.get_client(id).await?;
        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Modify, "clients", id)
                    .by(session)
                    .before(&before)
                    .after(&after),
            )
            .await;

        Ok(after)
    }

    /// ## Errors
    /// - `STATE_FORBIDDEN` while any sale names the client
    pub async fn delete_client(&self, session: &Session, id: i64) -> DbResult<()> {
        session.require_permission(PermissionToken::ClientesEliminar)?;
        let before = self.get_client(id).await?;

        let sales = count_refs(&self.pool, "sales", "client_id", id).await?;
        if sales > 0 {
            let reason = format!("{} sales reference it", sales);
            return Err(CoreError::forbidden("Client", id, reason).into());
        }

        sqlx::query("DELETE FROM clients WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        info!(client_id = id, "Client deleted");

        self.audit()
            .record_best_effort(
                AuditEvent::new(AuditAction::Delete, "clients", id)
                    .by(session)
                    .before(&before),
            )
            .await;

        Ok(())
    }

    pub async fn get_client(&self, id: i64) -> DbResult<Client> {
        let sql = format!("{} WHERE id = ?1", CLIENT_SELECT);
        sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Client", id))
    }

    pub async fn list_clients(&self, session: &Session) -> DbResult<Vec<Client>> {
        session.require_permission(PermissionToken::ClientesVer)?;
        let sql = format!("{} ORDER BY surname COLLATE NOCASE, name COLLATE NOCASE", CLIENT_SELECT);
        let rows = sqlx::query_as::<_, Client>(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Looks a client up by document, accepting any common spelling
    /// (`v-12.345.678` finds `V12345678`).
    pub async fn find_by_document(
        &self,
        doc_type: IdDocType,
        doc_number: &str,
    ) -> DbResult<Option<Client>> {
        let number = validate_doc_number(doc_type, doc_number)?;
        let sql = format!("{} WHERE doc_type = ?1 AND doc_number = ?2", CLIENT_SELECT);
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(doc_type)
            .bind(&number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }
}
