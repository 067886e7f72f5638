//! # bodega-db: Store Layer for Bodega POS
//!
//! SQLite store, transactions and repositories for a single-store
//! Venezuelan point of sale.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bodega POS Data Flow                             │
//! │                                                                         │
//! │  Front-end (cashier screen, back office)                               │
//! │       │  &Session                                                       │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bodega-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ Kardex  Sale   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Incoming Auth  │    │ 0001_initial │  │   │
//! │  │   │ StoreContext  │    │ Audit  Report  │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite file  $DB_SERVER/$DB_NAME.db  (WAL)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration
//! - [`pool`] - Connection pool, clock and repository handles
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Store error type and its mapping to [`bodega_core::ErrorKind`]
//! - [`repository`] - Repositories, one per concern
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bodega_db::{AppConfig, Database, DbConfig};
//!
//! let config = AppConfig::load()?;
//! let db = Database::new(DbConfig::from_app_config(&config)).await?;
//!
//! let session = db.auth().authenticate("admin", "clave-segura", None).await?;
//! let sale_id = db.sales().record_sale(&session, input).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AppConfig, ConfigError};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, StoreContext};

pub use repository::article::ArticleRepository;
pub use repository::audit::{AuditEvent, AuditLog};
pub use repository::auth::AuthService;
pub use repository::category::{CategoryRepository, PresentationRepository};
pub use repository::client::ClientRepository;
pub use repository::incoming::IncomingRepository;
pub use repository::kardex::{KardexRepository, Movement};
pub use repository::rate::RateRepository;
pub use repository::report::{DayBucket, ReportRepository, SalesReport, TopArticle};
pub use repository::role::RoleRepository;
pub use repository::sale::SaleRepository;
pub use repository::supplier::SupplierRepository;
pub use repository::worker::{WorkerLookup, WorkerRepository};
