//! # Domain Types
//!
//! Core domain types used throughout Bodega POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Identity            Catalog              Documents         Ledger      │
//! │  ─────────           ────────             ─────────         ──────      │
//! │  Worker              Category             IncomingDoc       KardexEntry │
//! │  Role                Presentation         IncomingLine      StockLevel  │
//! │  Permission          Article              SaleDoc                       │
//! │  ResetToken          Supplier(+Blob)      SaleLine                      │
//! │                      Client                                             │
//! │                                                                         │
//! │  Cross-cutting: Currency, ExchangeRate, AuditEntry, TaxRate             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity has an integer surrogate id assigned by the store. Business
//! keys (article code, username, document numbers) are unique on top of it.
//!
//! ## Money Fields
//! Amounts are stored as `*_cents` integers and exposed as [`Money`] through
//! accessor methods.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01%. The Venezuelan IVA of 16% is 1600 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (`16.0` → 1600 bps).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round().max(0.0) as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Currencies the business accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Bolívar, the base currency.
    Ves,
    Usd,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Ves, Currency::Usd, Currency::Eur];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ves => "VES",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Ves => "Bs",
            Currency::Usd => "$",
            Currency::Eur => "€",
        }
    }

    /// True for the accounting currency of the business.
    pub fn is_base(&self) -> bool {
        *self == crate::BASE_CURRENCY
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VES" | "BS" => Ok(Currency::Ves),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            _ => Err(ValidationError::NotAllowed {
                field: "currency".to_string(),
                allowed: vec!["VES".into(), "USD".into(), "EUR".into()],
            }),
        }
    }
}

/// State of a sale or incoming document.
///
/// ```text
/// [REGISTERED] ──(void)──► [VOIDED]   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum DocState {
    Registered,
    Voided,
}

impl Default for DocState {
    fn default() -> Self {
        DocState::Registered
    }
}

/// Fiscal document type for sales and incoming deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Factura,
    Boleta,
    Ticket,
}

impl DocumentType {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Factura => "FACTURA",
            DocumentType::Boleta => "BOLETA",
            DocumentType::Ticket => "TICKET",
        }
    }
}

impl FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FACTURA" => Ok(DocumentType::Factura),
            "BOLETA" => Ok(DocumentType::Boleta),
            "TICKET" => Ok(DocumentType::Ticket),
            _ => Err(ValidationError::NotAllowed {
                field: "doc_type".to_string(),
                allowed: vec!["FACTURA".into(), "BOLETA".into(), "TICKET".into()],
            }),
        }
    }
}

/// Identity document kind of a person or entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum IdDocType {
    /// Natural person: `V12345678`.
    Cedula,
    /// Entity: `J123456789`.
    Rif,
    Pasaporte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum Sex {
    #[serde(rename = "M")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "M"))]
    Male,
    #[serde(rename = "F")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "F"))]
    Female,
    #[serde(rename = "O")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "O"))]
    Other,
}

/// Kardex movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    In,
    Out,
}

impl MovementKind {
    /// Signed quantity this movement contributes to stock.
    pub fn signed(&self, qty: i64) -> i64 {
        match self {
            MovementKind::In => qty,
            MovementKind::Out => -qty,
        }
    }
}

/// Stock classification shown next to articles.
///
/// ```text
///   stock ≤ 2      → CRITICAL
///   2 < stock ≤ 5  → LOW
///   stock > 5      → NORMAL
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockLevel {
    Critical,
    Low,
    Normal,
}

impl StockLevel {
    pub fn from_stock(stock: i64) -> Self {
        if stock <= crate::STOCK_CRITICAL_MAX {
            StockLevel::Critical
        } else if stock <= crate::STOCK_LOW_MAX {
            StockLevel::Low
        } else {
            StockLevel::Normal
        }
    }
}

/// Audit action labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Modify,
    Delete,
    Void,
    Consult,
    Login,
    RecoverPassword,
    ModifyRate,
    Download,
    Upload,
}

// =============================================================================
// Identity Records
// =============================================================================

/// A worker (system user).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub sex: Sex,
    pub birth_date: Option<NaiveDate>,
    pub doc_type: IdDocType,
    pub doc_number: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string, or a legacy SHA-256 hex digest.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role_id: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// Name shown in audit entries.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub level: i64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Permission {
    pub id: i64,
    /// The authorization token, e.g. `ventas_crear`.
    pub name: String,
    pub module: String,
    pub description: String,
}

/// One-shot password reset token. Only the digest is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ResetToken {
    pub id: i64,
    pub worker_id: i64,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl ResetToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// =============================================================================
// Catalog Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Presentation {
    pub id: i64,
    pub name: String,
}

/// An article available for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Article {
    pub id: i64,
    /// Business identifier, unique.
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub presentation_id: i64,
    /// Sale price in base-currency cents.
    pub sale_price_cents: i64,
    /// Reference price (usually USD cents), informational only.
    pub reference_price_cents: Option<i64>,
    pub is_weighed: bool,
    pub price_per_kg_cents: Option<i64>,
    pub plu: Option<String>,
    pub barcode: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }
}

/// An article joined with its ledger balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleStock {
    pub article: Article,
    pub current_stock: i64,
    pub level: StockLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Supplier {
    pub id: i64,
    pub trade_name: String,
    pub sector: String,
    pub doc_type: IdDocType,
    pub doc_number: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// Metadata of a file attached to a supplier. The bytes are fetched
/// separately by `download_blob`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SupplierBlobMeta {
    pub id: i64,
    pub supplier_id: i64,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplierBlob {
    pub meta: SupplierBlobMeta,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub doc_type: IdDocType,
    pub doc_number: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

// =============================================================================
// Exchange Rates
// =============================================================================

/// A manually captured exchange rate: `rate` base units per `source_ccy` unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ExchangeRate {
    pub id: i64,
    pub source_ccy: Currency,
    pub target_ccy: Currency,
    pub rate: f64,
    /// Where the figure came from (e.g. `BCV`, `PARALELO`).
    pub source_kind: String,
    pub note: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub captured_by: String,
}

// =============================================================================
// Ledger
// =============================================================================

/// One kardex movement. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct KardexEntry {
    pub id: i64,
    pub article_id: i64,
    /// Per-article sequence, 1-based, gapless.
    pub seq: i64,
    pub ts: DateTime<Utc>,
    pub kind: MovementKind,
    pub ref_doc: String,
    pub qty: i64,
    pub unit_price_cents: Option<i64>,
    pub total_value_cents: i64,
    pub stock_before: i64,
    pub stock_after: i64,
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct IncomingDoc {
    pub id: i64,
    pub supplier_id: i64,
    pub worker_id: i64,
    pub ts: DateTime<Utc>,
    pub doc_type: DocumentType,
    pub series: String,
    pub number: String,
    pub vat_pct: f64,
    pub state: DocState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct IncomingLine {
    pub id: i64,
    pub incoming_id: i64,
    pub article_id: i64,
    pub qty: i64,
    pub unit_price_cents: i64,
}

/// A sale header. Totals are derived from its lines, see `SaleCart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleDoc {
    pub id: i64,
    pub client_id: Option<i64>,
    pub worker_id: i64,
    pub ts: DateTime<Utc>,
    /// Local business date of `ts`.
    pub sale_date: NaiveDate,
    pub doc_type: DocumentType,
    pub series: String,
    pub number: String,
    pub vat_pct: f64,
    pub state: DocState,
    pub payment_ccy: Currency,
    pub sale_ccy: Currency,
    /// Base units per sale-currency unit at the moment of sale (1.0 for base).
    pub snapshot_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    pub article_id: i64,
    pub qty: i64,
    pub unit_price_cents: i64,
}

// =============================================================================
// Audit
// =============================================================================

/// Append-only record of who did what, when, to which record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub action: AuditAction,
    pub table_name: String,
    /// 0 when the action does not target a row.
    pub record_id: i64,
    pub before: Option<String>,
    pub after: Option<String>,
    pub ip: String,
    pub ts: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
