//! Shared setup for the store integration tests.
//!
//! Everything goes through the public API: a root session holding every
//! token creates the role, worker, supplier and article a scenario needs.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use bodega_core::cart::CartLine;
use bodega_core::inputs::{
    ArticleInput, CategoryInput, IncomingInput, IncomingLineInput, RoleInput, SaleInput,
    SupplierInput, WorkerInput,
};
use bodega_core::{
    Currency, DocumentType, IdDocType, ManualClock, Money, PermissionSet, Session, Sex,
};
use bodega_db::{Database, DbConfig};
use chrono::{DateTime, TimeZone, Utc};

pub const PASSWORD: &str = "clave-segura-1";

/// 2024-05-01 12:00 UTC, 08:00 in Caracas.
pub fn may_first_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn root_session() -> Session {
    Session::new(0, "Dueño", "root", 0, PermissionSet::all(), Utc::now())
}

pub async fn memory_store_at(start: DateTime<Utc>) -> (Database, ManualClock) {
    let clock = ManualClock::new(start);
    let db = Database::with_clock(DbConfig::in_memory(), Arc::new(clock.clone()))
        .await
        .unwrap();
    (db, clock)
}

/// A file-backed store, so that several `Database` handles can share it.
pub async fn file_store(path: &Path) -> Database {
    let config = DbConfig::new(path).max_connections(2);
    Database::new(config).await.unwrap()
}

/// Ids of the rows every scenario starts from.
#[derive(Debug, Clone, Copy)]
pub struct Shop {
    pub role_id: i64,
    pub worker_id: i64,
    pub supplier_id: i64,
    pub article_id: i64,
}

impl Shop {
    /// Seeds permissions, a role with `perms`, worker `carla`, one supplier
    /// and article `HAR-001` without stock.
    pub async fn open(db: &Database, perms: &[&str]) -> Shop {
        let mut root = root_session();
        db.roles().seed_permissions().await.unwrap();

        let role_id = db
            .roles()
            .create_role(
                &root,
                RoleInput {
                    name: "Cajero".into(),
                    description: None,
                    level: 1,
                    active: true,
                },
            )
            .await
            .unwrap();
        for token in PermissionSet::from_names(perms.iter().copied()).iter() {
            db.roles().grant_permission(&mut root, role_id, token).await.unwrap();
        }

        let worker_id = db
            .workers()
            .create_worker(
                &root,
                WorkerInput {
                    name: "Carla".into(),
                    surname: "Gómez".into(),
                    sex: Sex::Female,
                    birth_date: None,
                    doc_type: IdDocType::Cedula,
                    doc_number: "V12345678".into(),
                    phone: None,
                    address: None,
                    username: "carla".into(),
                    email: "carla@bodega.com".into(),
                },
                role_id,
                PASSWORD,
            )
            .await
            .unwrap();

        let supplier_id = db
            .suppliers()
            .create_supplier(
                &root,
                SupplierInput {
                    trade_name: "Distribuidora El Llanero".into(),
                    sector: "Alimentos".into(),
                    doc_type: IdDocType::Rif,
                    doc_number: "J301234567".into(),
                    contact_name: None,
                    phone: None,
                    email: None,
                    address: None,
                },
            )
            .await
            .unwrap();

        let category = db
            .categories()
            .create_category(
                &root,
                CategoryInput {
                    name: "Víveres".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        let presentation = db.presentations().create_presentation(&root, "Unidad").await.unwrap();
        let article_id = db
            .articles()
            .create_article(
                &root,
                ArticleInput::simple("HAR-001", "Harina PAN 1kg", category, presentation, 500),
            )
            .await
            .unwrap();

        Shop {
            role_id,
            worker_id,
            supplier_id,
            article_id,
        }
    }

    /// Delivers `qty` units of the article at `unit_cents` each.
    pub async fn deliver(&self, db: &Database, number: &str, qty: i64, unit_cents: i64) -> i64 {
        db.incoming()
            .record_incoming(
                &root_session(),
                IncomingInput {
                    worker_id: self.worker_id,
                    supplier_id: self.supplier_id,
                    doc_type: DocumentType::Factura,
                    series: "F001".into(),
                    number: number.into(),
                    vat_pct: 16.0,
                    lines: vec![IncomingLineInput {
                        article_id: self.article_id,
                        qty,
                        unit_price_cents: unit_cents,
                    }],
                },
            )
            .await
            .unwrap()
    }

    /// A one-line ticket for the shop's article.
    pub fn ticket(
        &self,
        number: &str,
        qty: i64,
        unit_cents: i64,
        vat_pct: f64,
        ccy: Currency,
    ) -> SaleInput {
        SaleInput {
            worker_id: self.worker_id,
            client_id: None,
            doc_type: DocumentType::Ticket,
            series: "T001".into(),
            number: number.into(),
            vat_pct,
            payment_ccy: ccy,
            lines: vec![CartLine::new(self.article_id, qty, Money::from_cents(unit_cents))],
        }
    }
}
