//! Row builders shared by the repository unit tests.

use std::sync::Arc;

use bodega_core::inputs::WorkerInput;
use bodega_core::{IdDocType, ManualClock, MovementKind, PermissionSet, Session, Sex};
use chrono::{DateTime, TimeZone, Utc};

use crate::{Database, DbConfig};

pub(crate) async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// In-memory database on a manual clock starting at `start`.
pub(crate) async fn memory_db_at(start: DateTime<Utc>) -> (Database, ManualClock) {
    let clock = ManualClock::new(start);
    let db = Database::with_clock(DbConfig::in_memory(), Arc::new(clock.clone()))
        .await
        .unwrap();
    (db, clock)
}

/// 2024-05-01 12:00 UTC, 08:00 in Caracas.
pub(crate) fn may_first_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub(crate) fn session_with(worker_id: i64, perms: &[&str]) -> Session {
    Session::new(
        worker_id,
        "Ana Pérez",
        "ana",
        1,
        PermissionSet::from_names(perms.iter().copied()),
        Utc::now(),
    )
}

pub(crate) fn admin_session(worker_id: i64) -> Session {
    Session::new(worker_id, "Ana Pérez", "ana", 1, PermissionSet::all(), Utc::now())
}

pub(crate) async fn insert_role(db: &Database, name: &str) -> i64 {
    sqlx::query("INSERT INTO roles (name, level) VALUES (?1, 1)")
        .bind(name)
        .execute(db.pool())
        .await
        .unwrap()
        .last_insert_rowid()
}

pub(crate) async fn insert_worker(db: &Database, role_id: i64, username: &str) -> i64 {
    sqlx::query(
        r#"INSERT INTO workers (name, surname, sex, doc_type, doc_number, username, email,
                                password_hash, role_id, created_at)
           VALUES ('Ana', 'Pérez', 'F', 'CEDULA', ?1, ?2, ?3, 'x', ?4, '2024-05-01T00:00:00+00:00')"#,
    )
    .bind(format!("V{}", 10_000_000 + username.len() as i64 * 7919 + role_id))
    .bind(username)
    .bind(format!("{}@bodega.com", username))
    .bind(role_id)
    .execute(db.pool())
    .await
    .unwrap()
    .last_insert_rowid()
}

/// Inserts an article, creating its category and presentation on first use.
pub(crate) async fn insert_article(db: &Database, code: &str, price_cents: i64) -> i64 {
    sqlx::query("INSERT OR IGNORE INTO categories (id, name) VALUES (1, 'Víveres')")
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("INSERT OR IGNORE INTO presentations (id, name) VALUES (1, 'Unidad')")
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query(
        r#"INSERT INTO articles (code, name, category_id, presentation_id, sale_price_cents,
                                 created_at, updated_at)
           VALUES (?1, ?1, 1, 1, ?2, '2024-05-01T00:00:00+00:00', '2024-05-01T00:00:00+00:00')"#,
    )
    .bind(code)
    .bind(price_cents)
    .execute(db.pool())
    .await
    .unwrap()
    .last_insert_rowid()
}

pub(crate) async fn insert_supplier(db: &Database, doc_number: &str) -> i64 {
    sqlx::query(
        r#"INSERT INTO suppliers (trade_name, sector, doc_type, doc_number)
           VALUES ('Distribuidora Polar', 'Alimentos', 'RIF', ?1)"#,
    )
    .bind(doc_number)
    .execute(db.pool())
    .await
    .unwrap()
    .last_insert_rowid()
}

pub(crate) async fn insert_client(db: &Database, doc_number: &str) -> i64 {
    sqlx::query(
        r#"INSERT INTO clients (name, surname, doc_type, doc_number)
           VALUES ('José', 'Rojas', 'CEDULA', ?1)"#,
    )
    .bind(doc_number)
    .execute(db.pool())
    .await
    .unwrap()
    .last_insert_rowid()
}

pub(crate) async fn stock_up(db: &Database, article_id: i64, qty: i64) {
    db.kardex()
        .post_movement(article_id, MovementKind::In, qty, "INICIAL", None)
        .await
        .unwrap();
}

pub(crate) fn worker_input(username: &str, email: &str, doc: &str) -> WorkerInput {
    WorkerInput {
        name: "Carla".into(),
        surname: "Gómez".into(),
        sex: Sex::Female,
        birth_date: None,
        doc_type: IdDocType::Cedula,
        doc_number: doc.into(),
        phone: Some("0414-555-1234".into()),
        address: None,
        username: username.into(),
        email: email.into(),
    }
}
