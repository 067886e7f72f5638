//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Application root                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AppConfig::load() → DbConfig::from_app_config(&cfg)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌──────────────────┐    │
//! │  │            SqlitePool                    │   │  StoreContext    │    │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │   │  clock, offset,  │    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │   │  default IP      │    │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │   └──────────────────┘    │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.sales(), db.kardex(), db.auth() ...  cheap repository handles      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for:
//! - Readers don't block writers
//! - Writers don't block readers
//! - A single writer at a time, waited for up to `busy_timeout`

use bodega_core::clock::{local_date, offset_from_hours};
use bodega_core::{Clock, SystemClock};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::article::ArticleRepository;
use crate::repository::audit::AuditLog;
use crate::repository::auth::AuthService;
use crate::repository::category::{CategoryRepository, PresentationRepository};
use crate::repository::client::ClientRepository;
use crate::repository::incoming::IncomingRepository;
use crate::repository::kardex::KardexRepository;
use crate::repository::rate::RateRepository;
use crate::repository::report::ReportRepository;
use crate::repository::role::RoleRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::supplier::SupplierRepository;
use crate::repository::worker::WorkerRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/bodega/bodega.db")
///     .max_connections(5)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps them open.
    pub idle_timeout: Option<Duration>,

    /// How long a writer waits on SQLite's lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Offset of the shop's local time in hours.
    /// Default: -4 (Venezuela)
    pub utc_offset_hours: i32,

    /// Audit IP when a session supplies none.
    pub default_ip: String,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_millis(5000),
            run_migrations: true,
            utc_offset_hours: -4,
            default_ip: bodega_core::DEFAULT_AUDIT_IP.to_string(),
        }
    }

    /// Derives the pool settings from the loaded application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        DbConfig::new(config.database_path())
            .max_connections(config.max_connections)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .utc_offset_hours(config.utc_offset_hours)
            .default_ip(config.default_ip.clone())
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn utc_offset_hours(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    pub fn default_ip(mut self, ip: impl Into<String>) -> Self {
        self.default_ip = ip.into();
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Database is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(1),
            run_migrations: true,
            utc_offset_hours: -4,
            default_ip: bodega_core::DEFAULT_AUDIT_IP.to_string(),
        }
    }
}

// =============================================================================
// Store Context
// =============================================================================

/// Time and locale settings shared by every repository handle.
///
/// Timestamps issued through `now()` never go backwards, even if the
/// underlying clock does.
#[derive(Clone)]
pub struct StoreContext {
    clock: Arc<dyn Clock>,
    last_issued: Arc<Mutex<Option<DateTime<Utc>>>>,
    offset: FixedOffset,
    default_ip: String,
}

impl StoreContext {
    pub fn new(
        clock: Arc<dyn Clock>,
        utc_offset_hours: i32,
        default_ip: impl Into<String>,
    ) -> Self {
        StoreContext {
            clock,
            last_issued: Arc::new(Mutex::new(None)),
            offset: offset_from_hours(utc_offset_hours),
            default_ip: default_ip.into(),
        }
    }

    /// Current instant, clamped to be no earlier than the last one issued.
    pub fn now(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut last = self.last_issued.lock().unwrap_or_else(|e| e.into_inner());
        let issued = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(issued);
        issued
    }

    /// Business date of `ts` in the shop's offset.
    pub fn local_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        local_date(ts, self.offset)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(self.clock.now())
    }

    pub fn default_ip(&self) -> &str {
        &self.default_ip
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("offset", &self.offset)
            .field("default_ip", &self.default_ip)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Owned by the application root and passed down by reference; there is no
/// module-level connection.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::from_app_config(&AppConfig::load()?)).await?;
/// let session = db.auth().authenticate("admin", "secret", None).await?;
/// let sale_id = db.sales().record_sale(&session, input).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
    ctx: StoreContext,
}

impl Database {
    /// Creates a new database connection pool on the system clock.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - Busy timeout for competing writers
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn with_clock(config: DbConfig, clock: Arc<dyn Clock>) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let ctx = StoreContext::new(clock, config.utc_offset_hours, config.default_ip.clone());
        let db = Database { pool, ctx };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    // -------------------------------------------------------------------------
    // Repository accessors
    // -------------------------------------------------------------------------

    pub fn kardex(&self) -> KardexRepository {
        KardexRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn incoming(&self) -> IncomingRepository {
        IncomingRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn rates(&self) -> RateRepository {
        RateRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn workers(&self) -> WorkerRepository {
        WorkerRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn roles(&self) -> RoleRepository {
        RoleRepository::new(self.pool.clone(), self.ctx.clone())
    }

    /// Authentication and password recovery, wired to the worker repository
    /// through the `WorkerLookup` capability.
    pub fn auth(&self) -> AuthService {
        AuthService::new(
            self.pool.clone(),
            self.ctx.clone(),
            Arc::new(self.workers()),
            self.roles(),
        )
    }

    pub fn categories(&self) -> CategoryRepository {
        CategoryRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn presentations(&self) -> PresentationRepository {
        PresentationRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn articles(&self) -> ArticleRepository {
        ArticleRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn suppliers(&self) -> SupplierRepository {
        SupplierRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn clients(&self) -> ClientRepository {
        ClientRepository::new(self.pool.clone(), self.ctx.clone())
    }

    pub fn reports(&self) -> ReportRepository {
        ReportRepository::new(self.pool.clone(), self.ctx.clone())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
