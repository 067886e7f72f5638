//! # Seed Data Generator
//!
//! Bootstraps an empty store for development and demos.
//!
//! ## Usage
//! ```bash
//! # Store location from DB_SERVER / DB_NAME (default ./bodega.db)
//! cargo run -p bodega-db --bin seed
//!
//! # Explicit file and admin password
//! cargo run -p bodega-db --bin seed -- --db ./data/bodega.db --password "clave-admin-1"
//!
//! # More detail
//! RUST_LOG=bodega_db=debug cargo run -p bodega-db --bin seed
//! ```
//!
//! ## What Gets Created
//! - The 21 permission tokens
//! - Role `Administrador` holding every token
//! - Worker `admin`
//! - Categories, presentations and a small article catalog
//! - One supplier and an opening incoming document (stock)
//! - USD and EUR exchange rates
//!
//! Running it against a store that already has workers does nothing.

use std::env;

use bodega_core::inputs::{
    ArticleInput, CategoryInput, IncomingInput, IncomingLineInput, RoleInput, SupplierInput,
    WorkerInput,
};
use bodega_core::{
    Currency, DocumentType, IdDocType, PermissionSet, PermissionToken, Session, Sex, SYSTEM_ACTOR,
};
use bodega_db::{AppConfig, Database, DbConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// (code, name, category index, presentation index, price in Bs cents, opening qty, cost cents)
const ARTICLES: &[(&str, &str, usize, usize, i64, i64, i64)] = &[
    ("HAR-PAN-1K", "Harina PAN 1kg", 0, 0, 4_500, 120, 3_600),
    ("ARR-MAR-1K", "Arroz Mary 1kg", 0, 0, 3_800, 80, 2_900),
    ("PAS-PRI-1K", "Pasta Primor 1kg", 0, 0, 4_200, 60, 3_300),
    ("ACE-VAT-1L", "Aceite Vatel 1L", 0, 0, 9_000, 40, 7_200),
    ("CAF-FAM-500", "Café Fama de América 500g", 0, 0, 13_500, 25, 10_800),
    ("AZU-MON-1K", "Azúcar Montalbán 1kg", 0, 0, 3_500, 4, 2_700),
    ("DET-ACE-1K", "Detergente Ace 1kg", 1, 0, 7_800, 30, 6_100),
    ("JAB-LUX-3", "Jabón Lux paquete x3", 1, 2, 5_400, 2, 4_200),
    ("MAL-POL-6", "Malta Polar caja x6", 2, 2, 10_200, 18, 8_000),
    ("REF-GOL-2L", "Refresco Golden 2L", 2, 0, 4_900, 36, 3_700),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("Víveres", "Alimentos no perecederos"),
    ("Limpieza", "Artículos de limpieza del hogar"),
    ("Bebidas", "Refrescos, maltas y jugos"),
];

const PRESENTATIONS: &[&str] = &["Unidad", "Kilogramo", "Paquete"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let app_config = AppConfig::load()?;
    let mut db_path = app_config.database_path();
    let mut password = String::from("admin-bodega-1");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--password" | "-p" => {
                if i + 1 < args.len() {
                    password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bodega POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>         Database file (default: $DB_SERVER/$DB_NAME.db)");
                println!("  -p, --password <PASS>   Password for the admin worker");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Bodega POS Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path.display());
    println!();

    let mut config = DbConfig::from_app_config(&app_config);
    config.database_path = db_path;
    let db = Database::new(config).await?;
    println!("✓ Connected to database, migrations applied");

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workers")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        println!("⚠ Database already has {} workers", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let seeded = db.roles().seed_permissions().await?;
    println!("✓ {} permission tokens", seeded);

    // Bootstrap actor: audited as SYSTEM, holds every token
    let mut system = Session::new(
        0,
        SYSTEM_ACTOR,
        "system",
        0,
        PermissionSet::all(),
        db.context().now(),
    );

    let admin_role = db
        .roles()
        .create_role(
            &system,
            RoleInput {
                name: "Administrador".into(),
                description: Some("Acceso total".into()),
                level: 10,
                active: true,
            },
        )
        .await?;
    for token in PermissionToken::ALL {
        db.roles().grant_permission(&mut system, admin_role, token).await?;
    }

    let cashier_role = db
        .roles()
        .create_role(
            &system,
            RoleInput {
                name: "Cajero".into(),
                description: Some("Ventas y consulta de inventario".into()),
                level: 1,
                active: true,
            },
        )
        .await?;
    for token in [
        PermissionToken::VentasCrear,
        PermissionToken::VentasVer,
        PermissionToken::ClientesVer,
        PermissionToken::ClientesCrear,
        PermissionToken::ArticulosVer,
        PermissionToken::InventarioVer,
    ] {
        db.roles().grant_permission(&mut system, cashier_role, token).await?;
    }
    println!("✓ Roles: Administrador, Cajero");

    let admin_id = db
        .workers()
        .create_worker(
            &system,
            WorkerInput {
                name: "Administrador".into(),
                surname: "Bodega".into(),
                sex: Sex::Other,
                birth_date: None,
                doc_type: IdDocType::Cedula,
                doc_number: "V00000001".into(),
                phone: None,
                address: None,
                username: "admin".into(),
                email: "admin@bodega.local".into(),
            },
            admin_role,
            &password,
        )
        .await?;
    println!("✓ Worker 'admin'");

    let admin = db.auth().authenticate("admin", &password, None).await?;

    let mut category_ids = Vec::new();
    for (name, description) in CATEGORIES {
        let id = db
            .categories()
            .create_category(
                &admin,
                CategoryInput {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                },
            )
            .await?;
        category_ids.push(id);
    }

    let mut presentation_ids = Vec::new();
    for name in PRESENTATIONS {
        presentation_ids.push(db.presentations().create_presentation(&admin, name).await?);
    }
    println!("✓ {} categories, {} presentations", category_ids.len(), presentation_ids.len());

    let mut opening_lines = Vec::new();
    for (code, name, category, presentation, price, qty, cost) in ARTICLES {
        let id = db
            .articles()
            .create_article(
                &admin,
                ArticleInput::simple(
                    *code,
                    *name,
                    category_ids[*category],
                    presentation_ids[*presentation],
                    *price,
                ),
            )
            .await?;
        opening_lines.push(IncomingLineInput {
            article_id: id,
            qty: *qty,
            unit_price_cents: *cost,
        });
    }
    println!("✓ {} articles", ARTICLES.len());

    let supplier = db
        .suppliers()
        .create_supplier(
            &admin,
            SupplierInput {
                trade_name: "Distribuidora El Llanero".into(),
                sector: "Alimentos y bebidas".into(),
                doc_type: IdDocType::Rif,
                doc_number: "J-30123456-7".into(),
                contact_name: Some("Rafael Pérez".into()),
                phone: Some("0241-555-0101".into()),
                email: Some("pedidos@elllanero.com.ve".into()),
                address: Some("Zona Industrial, Valencia".into()),
            },
        )
        .await?;

    let incoming = db
        .incoming()
        .record_incoming(
            &admin,
            IncomingInput {
                worker_id: admin_id,
                supplier_id: supplier,
                doc_type: DocumentType::Factura,
                series: "A".into(),
                number: "0001".into(),
                vat_pct: 16.0,
                lines: opening_lines,
            },
        )
        .await?;
    println!("✓ Opening stock (incoming #{})", incoming);

    db.rates().record_rate(&admin, "BCV", Currency::Usd, 36.50, Some("semilla")).await?;
    db.rates().record_rate(&admin, "BCV", Currency::Eur, 39.80, Some("semilla")).await?;
    println!("✓ Rates USD 36.50, EUR 39.80");

    let low = db.kardex().low_stock(&admin, 10).await?;
    info!(low_stock = low.len(), "Seed complete");

    println!();
    println!("✓ Seed complete! Log in as 'admin'.");
    if !low.is_empty() {
        println!("  {} articles start with low stock:", low.len());
        for item in low {
            println!("    {} ({}): {}", item.article.code, item.article.name, item.current_stock);
        }
    }

    Ok(())
}
