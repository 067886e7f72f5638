//! # Sale Cart
//!
//! Pure totals arithmetic for sale documents.
//!
//! A sale header stores only `vat_pct`, the payment currency and the rate
//! snapshot; every total is derived from its lines. The same `SaleCart`
//! computes totals before a sale is recorded (to show the customer) and
//! after (to read a stored sale back or aggregate a report).
//!
//! ## Totals Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   lines ──► subtotal = Σ qty · unit_price                               │
//! │                 │                                                       │
//! │                 ├──► vat = subtotal · vat_pct / 100   (half-up cents)   │
//! │                 ▼                                                       │
//! │           total_sale_ccy = subtotal + vat                               │
//! │                 │                                                       │
//! │                 ▼  × snapshot_rate (1.0 when sale currency is base)     │
//! │           total_base_ccy                                                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{SaleLine, TaxRate};
use crate::validation::{validate_quantity, validate_sale_price_cents, validate_vat_pct};
use crate::MAX_DOC_LINES;

/// One requested line of a sale or incoming document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub article_id: i64,
    pub qty: i64,
    pub unit_price: Money,
}

impl CartLine {
    pub fn new(article_id: i64, qty: i64, unit_price: Money) -> Self {
        CartLine {
            article_id,
            qty,
            unit_price,
        }
    }

    /// `qty × unit_price`
    pub fn line_total(&self) -> CoreResult<Money> {
        self.unit_price
            .checked_multiply_quantity(self.qty)
            .ok_or_else(|| ValidationError::overflow("line total").into())
    }
}

impl From<&SaleLine> for CartLine {
    fn from(line: &SaleLine) -> Self {
        CartLine::new(
            line.article_id,
            line.qty,
            Money::from_cents(line.unit_price_cents),
        )
    }
}

/// Derived totals of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub vat: Money,
    /// Subtotal plus VAT, in the sale currency.
    pub total_sale_ccy: Money,
    /// `total_sale_ccy` converted at the snapshot rate.
    pub total_base_ccy: Money,
}

/// Lines plus VAT percentage.
///
/// ## Invariants
/// - Lines keep their submission order (ledger postings follow it)
/// - Every line has `qty > 0` and `unit_price > 0`
/// - At most `MAX_DOC_LINES` lines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleCart {
    lines: Vec<CartLine>,
    vat_pct: f64,
}

impl SaleCart {
    /// Creates an empty cart with the given VAT percentage (`16.0` for 16%).
    pub fn new(vat_pct: f64) -> Self {
        SaleCart {
            lines: Vec::new(),
            vat_pct,
        }
    }

    /// Rebuilds the cart of a stored sale.
    pub fn from_lines(vat_pct: f64, lines: &[SaleLine]) -> Self {
        SaleCart {
            lines: lines.iter().map(CartLine::from).collect(),
            vat_pct,
        }
    }

    /// Appends a line after checking its quantity and price.
    ///
    /// Repeated articles stay as separate lines so that the document reads
    /// back exactly as submitted.
    pub fn add_line(&mut self, line: CartLine) -> CoreResult<()> {
        validate_quantity(line.qty)?;
        validate_sale_price_cents(line.unit_price.cents())?;

        if self.lines.len() >= MAX_DOC_LINES {
            return Err(ValidationError::OutOfRange {
                field: "lines".to_string(),
                min: 1,
                max: MAX_DOC_LINES as i64,
            }
            .into());
        }

        // the document must stay summable once the line is in
        self.subtotal()?
            .checked_add(line.line_total()?)
            .ok_or_else(|| ValidationError::overflow("subtotal"))?;

        self.lines.push(line);
        Ok(())
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn vat_pct(&self) -> f64 {
        self.vat_pct
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Checks the document-level contract: VAT not negative, at least one line.
    pub fn validate(&self) -> CoreResult<()> {
        validate_vat_pct(self.vat_pct)?;
        if self.lines.is_empty() {
            return Err(ValidationError::Empty {
                field: "lines".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Total quantity requested per article, in first-seen order.
    pub fn qty_by_article(&self) -> Vec<(i64, i64)> {
        let mut out: Vec<(i64, i64)> = Vec::new();
        for line in &self.lines {
            match out.iter_mut().find(|(id, _)| *id == line.article_id) {
                // saturated totals still exceed any stock
                Some((_, qty)) => *qty = qty.saturating_add(line.qty),
                None => out.push((line.article_id, line.qty)),
            }
        }
        out
    }

    pub fn subtotal(&self) -> CoreResult<Money> {
        self.lines.iter().try_fold(Money::zero(), |acc, line| -> CoreResult<Money> {
            acc.checked_add(line.line_total()?)
                .ok_or_else(|| ValidationError::overflow("subtotal").into())
        })
    }

    pub fn vat(&self) -> CoreResult<Money> {
        self.subtotal()?
            .calculate_tax(TaxRate::from_percentage(self.vat_pct))
            .ok_or_else(|| ValidationError::overflow("vat").into())
    }

    /// Computes every total. `snapshot_rate` is the base units per sale
    /// currency unit; pass `1.0` for a base-currency sale.
    ///
    /// Fails with an overflow error when an amount leaves the `i64` range.
    pub fn totals(&self, snapshot_rate: f64) -> CoreResult<SaleTotals> {
        let subtotal = self.subtotal()?;
        let vat = self.vat()?;
        let total_sale_ccy = subtotal
            .checked_add(vat)
            .ok_or_else(|| ValidationError::overflow("total"))?;
        let total_base_ccy = total_sale_ccy
            .convert(snapshot_rate)
            .ok_or_else(|| ValidationError::overflow("total in base currency"))?;

        Ok(SaleTotals {
            subtotal,
            vat,
            total_sale_ccy,
            total_base_ccy,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_with_snapshot_rate() {
        let mut cart = SaleCart::new(16.0);
        cart.add_line(CartLine::new(1, 1, Money::from_cents(500))).unwrap();

        let totals = cart.totals(60.0).unwrap();
        assert_eq!(totals.subtotal.cents(), 500);
        assert_eq!(totals.vat.cents(), 80);
        assert_eq!(totals.total_sale_ccy.cents(), 580);
        assert_eq!(totals.total_base_ccy.cents(), 34_800);
    }

    #[test]
    fn test_base_currency_rate_is_identity() {
        let mut cart = SaleCart::new(0.0);
        cart.add_line(CartLine::new(1, 4, Money::from_cents(2500))).unwrap();

        let totals = cart.totals(1.0).unwrap();
        assert_eq!(totals.total_sale_ccy, totals.total_base_ccy);
        assert_eq!(totals.total_sale_ccy.cents(), 10_000);
    }

    #[test]
    fn test_rejects_bad_lines() {
        let mut cart = SaleCart::new(16.0);
        assert!(cart.add_line(CartLine::new(1, 0, Money::from_cents(100))).is_err());
        assert!(cart.add_line(CartLine::new(1, 1, Money::zero())).is_err());
        assert!(cart.is_empty());
        assert!(cart.validate().is_err());
    }

    #[test]
    fn test_negative_vat_rejected() {
        let mut cart = SaleCart::new(-1.0);
        cart.add_line(CartLine::new(1, 1, Money::from_cents(100))).unwrap();
        assert!(cart.validate().is_err());
    }

    #[test]
    fn test_qty_by_article_merges_repeats() {
        let mut cart = SaleCart::new(16.0);
        cart.add_line(CartLine::new(7, 2, Money::from_cents(100))).unwrap();
        cart.add_line(CartLine::new(3, 1, Money::from_cents(100))).unwrap();
        cart.add_line(CartLine::new(7, 5, Money::from_cents(90))).unwrap();

        assert_eq!(cart.qty_by_article(), vec![(7, 7), (3, 1)]);
        assert_eq!(cart.lines().len(), 3);
        assert_eq!(cart.subtotal().unwrap().cents(), 200 + 100 + 450);
    }

    #[test]
    fn test_line_limit() {
        let mut cart = SaleCart::new(0.0);
        for i in 0..MAX_DOC_LINES {
            cart.add_line(CartLine::new(i as i64, 1, Money::from_cents(1))).unwrap();
        }
        assert!(cart.add_line(CartLine::new(0, 1, Money::from_cents(1))).is_err());
    }

    #[test]
    fn test_overflowing_line_rejected() {
        let mut cart = SaleCart::new(16.0);
        let err = cart
            .add_line(CartLine::new(1, i64::MAX / 2, Money::from_cents(3)))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        assert!(cart.is_empty());

        cart.add_line(CartLine::new(1, i64::MAX / 3, Money::from_cents(2))).unwrap();
        assert!(cart.add_line(CartLine::new(2, i64::MAX / 3, Money::from_cents(2))).is_err());
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_totals_overflow_is_an_error() {
        let mut cart = SaleCart::new(16.0);
        cart.add_line(CartLine::new(1, 1, Money::from_cents(i64::MAX - 1))).unwrap();
        assert!(cart.totals(1.0).is_err());
    }

    #[test]
    fn test_repeated_huge_quantities_saturate() {
        let line = |id: i64, qty: i64| SaleLine {
            id,
            sale_id: 1,
            article_id: 1,
            qty,
            unit_price_cents: 0,
        };
        let lines = [line(1, i64::MAX - 1), line(2, 5)];
        let stored = SaleCart::from_lines(0.0, &lines);
        assert_eq!(stored.qty_by_article(), vec![(1, i64::MAX)]);
    }
}
