//! # bodega-core: Pure Business Logic for Bodega POS
//!
//! This crate contains every business rule of the point-of-sale that can be
//! expressed without touching the store: money and VAT arithmetic, sale
//! totals across currencies, Venezuelan field formats, permission tokens and
//! sessions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bodega POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             Terminal front-end (external collaborator)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Session + inputs                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 bodega-db (store + transactions)                │   │
//! │  │   kardex · incoming · sales · identity · audit · rates · report │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bodega-core (THIS CRATE) ★                      │   │
//! │  │   types · money · cart · validation · permissions · session    │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use bodega_core::cart::{SaleCart, CartLine};
//! use bodega_core::Money;
//!
//! let mut cart = SaleCart::new(16.0);
//! cart.add_line(CartLine::new(1, 1, Money::from_cents(500))).unwrap();
//!
//! // 5.00 + 16% IVA = 5.80, at 60 Bs/USD = 348.00 Bs
//! let totals = cart.totals(60.0).unwrap();
//! assert_eq!(totals.total_sale_ccy.cents(), 580);
//! assert_eq!(totals.total_base_ccy.cents(), 34_800);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod clock;
pub mod error;
pub mod inputs;
pub mod money;
pub mod permissions;
pub mod session;
pub mod token;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use permissions::{PermissionChecker, PermissionSet, PermissionToken};
pub use session::{ActorSlot, Session};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Accounting currency of the business.
pub const BASE_CURRENCY: Currency = Currency::Ves;

/// Actor name recorded when no session performed the change.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// IP recorded in audit entries when the caller supplies none.
pub const DEFAULT_AUDIT_IP: &str = "127.0.0.1";

/// Stock at or below this is CRITICAL.
pub const STOCK_CRITICAL_MAX: i64 = 2;

/// Stock at or below this (and above critical) is LOW.
pub const STOCK_LOW_MAX: i64 = 5;

/// Largest supplier attachment accepted (10 MiB).
pub const MAX_BLOB_SIZE: usize = 10 * 1024 * 1024;

/// Lifetime of a password-reset token.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 30;

/// Maximum lines on a single sale or incoming document.
pub const MAX_DOC_LINES: usize = 200;
