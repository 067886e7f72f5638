//! # Validation Module
//!
//! Field contracts for Bodega POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front-end                                                    │
//! │  └── Masked input, immediate feedback                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (called by every repository mutation)            │
//! │  ├── Venezuelan identity formats (cédula, RIF, pasaporte)              │
//! │  ├── Phone, email, dates                                               │
//! │  └── Quantities, prices, rates, attachment types                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE constraints (code, username, document numbers)             │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bodega_core::validation::{validate_doc_number, parse_date};
//! use bodega_core::IdDocType;
//!
//! assert!(validate_doc_number(IdDocType::Rif, "J123456789").is_ok());
//! assert!(parse_date("29/02/2024").is_ok());
//! assert!(parse_date("29/02/2023").is_err());
//! ```

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;
use crate::types::IdDocType;
use crate::{MAX_BLOB_SIZE, MAX_DOC_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

static CEDULA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[VE]\d{8}$").unwrap());
static RIF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[JPGVCE]\d{9}$").unwrap());
static PASSPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{6,12}$").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap()
});

/// Allowed supplier attachment extensions and their MIME types.
pub const ALLOWED_ATTACHMENTS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("pdf", "application/pdf"),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("csv", "text/csv"),
    ("txt", "text/plain"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

// =============================================================================
// String Validators
// =============================================================================

/// Trims `value` and checks it is non-empty and at most `max` characters.
///
/// Returns the trimmed string.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Optional text: `None` or blank becomes `None`; otherwise length-checked.
pub fn validate_optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => validate_text(field, v, max).map(Some),
    }
}

/// Category name: 1-50 characters after trim.
pub fn validate_category_name(name: &str) -> ValidationResult<String> {
    validate_text("name", name, 50)
}

/// Category description: up to 256 characters.
pub fn validate_category_description(desc: Option<&str>) -> ValidationResult<Option<String>> {
    validate_optional_text("description", desc, 256)
}

/// Validates an article code.
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Only letters, digits, hyphens and underscores
pub fn validate_article_code(code: &str) -> ValidationResult<String> {
    let code = validate_text("code", code, 50)?;

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_format(
            "code",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(code)
}

/// Username: 3-50 characters, letters, digits, `.`, `_`, `-`.
pub fn validate_username(username: &str) -> ValidationResult<String> {
    let username = validate_text("username", username, 50)?;

    if username.chars().count() < 3 {
        return Err(ValidationError::invalid_format(
            "username",
            "must be at least 3 characters",
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(ValidationError::invalid_format(
            "username",
            "must contain only letters, numbers, dots, hyphens, and underscores",
        ));
    }

    Ok(username)
}

/// Password policy: at least 8 characters, at most 128.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    let len = password.chars().count();
    if len < 8 || len > 128 {
        return Err(ValidationError::OutOfRange {
            field: "password length".to_string(),
            min: 8,
            max: 128,
        });
    }
    Ok(())
}

// =============================================================================
// Venezuelan Identity Formats
// =============================================================================

/// Normalizes a document number: strips spaces, dots and hyphens, uppercases.
///
/// `"v-12.345.678"` → `"V12345678"`
pub fn normalize_doc_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

/// Validates a document number against its type and returns it normalized.
///
/// ## Formats
/// ```text
/// CEDULA     ^[VE]\d{8}$        V12345678
/// RIF        ^[JPGVCE]\d{9}$    J123456789
/// PASAPORTE  6-12 alphanumeric  AB1234567
/// ```
pub fn validate_doc_number(doc_type: IdDocType, raw: &str) -> ValidationResult<String> {
    let number = normalize_doc_number(raw);

    if number.is_empty() {
        return Err(ValidationError::required("doc_number"));
    }

    let (ok, reason) = match doc_type {
        IdDocType::Cedula => (CEDULA_RE.is_match(&number), "cedula must look like V12345678"),
        IdDocType::Rif => (RIF_RE.is_match(&number), "RIF must look like J123456789"),
        IdDocType::Pasaporte => (
            PASSPORT_RE.is_match(&number),
            "passport must be 6-12 letters or digits",
        ),
    };

    if !ok {
        return Err(ValidationError::invalid_format("doc_number", reason));
    }

    Ok(number)
}

/// Validates a phone number: 10-12 digits once `+`, `-` and whitespace are
/// stripped. Returns the digits only.
pub fn validate_phone(raw: &str) -> ValidationResult<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '+' && *c != '-')
        .collect();

    if !stripped.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid_format(
            "phone",
            "must contain only digits",
        ));
    }

    let len = stripped.len();
    if !(10..=12).contains(&len) {
        return Err(ValidationError::invalid_format(
            "phone",
            "must have between 10 and 12 digits",
        ));
    }

    Ok(stripped)
}

/// Validates an email address (`local@domain.tld`, TLD of 2+ letters).
pub fn validate_email(raw: &str) -> ValidationResult<String> {
    let email = validate_text("email", raw, 254)?;

    if !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::invalid_format(
            "email",
            "must look like user@domain.tld",
        ));
    }

    Ok(email)
}

// =============================================================================
// Dates
// =============================================================================

/// Gregorian leap-year rule.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Parses a date entered as `DD/MM/YYYY`, `DD-MM-YYYY`, `YYYY-MM-DD` or
/// `DDMMYYYY`.
pub fn parse_date(raw: &str) -> ValidationResult<NaiveDate> {
    let raw = raw.trim();
    let bad = || {
        ValidationError::invalid_format(
            "date",
            "expected DD/MM/YYYY, DD-MM-YYYY, YYYY-MM-DD or DDMMYYYY",
        )
    };

    let parts: Vec<&str> = raw.split(|c| c == '/' || c == '-').collect();
    let (day, month, year) = match parts.as_slice() {
        [y, m, d] if y.len() == 4 => (*d, *m, *y),
        [d, m, y] if y.len() == 4 => (*d, *m, *y),
        [compact] if compact.len() == 8 => (&compact[0..2], &compact[2..4], &compact[4..8]),
        _ => return Err(bad()),
    };

    let day: u32 = day.parse().map_err(|_| bad())?;
    let month: u32 = month.parse().map_err(|_| bad())?;
    let year: i32 = year.parse().map_err(|_| bad())?;

    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return Err(ValidationError::invalid_format("date", "day or month out of range"));
    }

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Quantity on a document line or ledger movement: strictly positive.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Catalog or incoming price: zero allowed, negative rejected.
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Sale line price: strictly positive.
pub fn validate_sale_price_cents(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "unit_price".to_string(),
        });
    }
    Ok(())
}

/// VAT percentage: finite and not negative.
pub fn validate_vat_pct(pct: f64) -> ValidationResult<()> {
    if !pct.is_finite() || pct < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "vat_pct".to_string(),
        });
    }
    Ok(())
}

/// Exchange rate: finite and strictly positive. `f64::MIN_POSITIVE` passes.
pub fn validate_rate(rate: f64) -> ValidationResult<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "rate".to_string(),
        });
    }
    Ok(())
}

/// Document lines: at least one, at most `MAX_DOC_LINES`.
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Empty {
            field: "lines".to_string(),
        });
    }
    if count > MAX_DOC_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_DOC_LINES as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Attachments
// =============================================================================

/// Resolves the MIME type for an attachment file name and checks its size.
///
/// ## Example
/// ```rust
/// use bodega_core::validation::validate_attachment;
///
/// assert_eq!(validate_attachment("lista.PDF", 1024).unwrap(), "application/pdf");
/// assert!(validate_attachment("virus.exe", 10).is_err());
/// ```
pub fn validate_attachment(filename: &str, size: usize) -> ValidationResult<&'static str> {
    let filename = filename.trim();
    if filename.is_empty() {
        return Err(ValidationError::required("filename"));
    }

    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let mime = ALLOWED_ATTACHMENTS
        .iter()
        .find(|(allowed, _)| *allowed == ext)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| ValidationError::NotAllowed {
            field: "extension".to_string(),
            allowed: ALLOWED_ATTACHMENTS
                .iter()
                .map(|(e, _)| format!(".{}", e))
                .collect(),
        })?;

    if size == 0 || size > MAX_BLOB_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "size".to_string(),
            min: 1,
            max: MAX_BLOB_SIZE as i64,
        });
    }

    Ok(mime)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_article_code() {
        assert!(validate_article_code("HAR-PAN-1KG").is_ok());
        assert!(validate_article_code("").is_err());
        assert!(validate_article_code("has space").is_err());
        assert!(validate_article_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_category_lengths() {
        assert_eq!(validate_category_name("  Víveres ").unwrap(), "Víveres");
        assert!(validate_category_name("   ").is_err());
        assert!(validate_category_name(&"x".repeat(51)).is_err());
        assert!(validate_category_description(Some(&"x".repeat(257))).is_err());
        assert_eq!(validate_category_description(Some("  ")).unwrap(), None);
    }

    #[test]
    fn test_cedula() {
        assert_eq!(
            validate_doc_number(IdDocType::Cedula, "v-12.345.678").unwrap(),
            "V12345678"
        );
        assert!(validate_doc_number(IdDocType::Cedula, "E87654321").is_ok());
        assert!(validate_doc_number(IdDocType::Cedula, "J12345678").is_err());
        assert!(validate_doc_number(IdDocType::Cedula, "V1234567").is_err());
    }

    #[test]
    fn test_rif() {
        assert!(validate_doc_number(IdDocType::Rif, "J-12345678-9").is_ok());
        assert!(validate_doc_number(IdDocType::Rif, "G200000001").is_ok());
        assert!(validate_doc_number(IdDocType::Rif, "X123456789").is_err());
        assert!(validate_doc_number(IdDocType::Rif, "J12345678").is_err());
    }

    #[test]
    fn test_passport() {
        assert!(validate_doc_number(IdDocType::Pasaporte, "AB1234").is_ok());
        assert!(validate_doc_number(IdDocType::Pasaporte, "AB123").is_err());
        assert!(validate_doc_number(IdDocType::Pasaporte, "ABCDEFGHIJKLM").is_err());
    }

    #[test]
    fn test_phone() {
        assert_eq!(validate_phone("+58 412-555-1234").unwrap(), "584125551234");
        assert_eq!(validate_phone("0412 5551234").unwrap(), "04125551234");
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("0412-555-12ab").is_err());
        assert!(validate_phone("5841255512345").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("ventas@bodega.com.ve").is_ok());
        assert!(validate_email("a@b.c").is_err());
        assert!(validate_email("sin-arroba.com").is_err());
    }

    #[test]
    fn test_leap_years() {
        assert!(is_leap_year(2024));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2023));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(parse_date("01/05/2024").unwrap(), expected);
        assert_eq!(parse_date("01-05-2024").unwrap(), expected);
        assert_eq!(parse_date("2024-05-01").unwrap(), expected);
        assert_eq!(parse_date("01052024").unwrap(), expected);

        assert!(parse_date("29/02/2024").is_ok());
        assert!(parse_date("29/02/1900").is_err());
        assert!(parse_date("31/04/2024").is_err());
        assert!(parse_date("2024/5").is_err());
    }

    #[test]
    fn test_numeric_validators() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_price_cents("price", 0).is_ok());
        assert!(validate_price_cents("price", -1).is_err());
        assert!(validate_sale_price_cents(0).is_err());
        assert!(validate_vat_pct(16.0).is_ok());
        assert!(validate_vat_pct(-0.5).is_err());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(validate_rate(0.0).is_err());
        assert!(validate_rate(-1.0).is_err());
        assert!(validate_rate(f64::NAN).is_err());
        assert!(validate_rate(f64::MIN_POSITIVE).is_ok());
        assert!(validate_rate(5e-324).is_ok());
    }

    #[test]
    fn test_line_count() {
        assert!(validate_line_count(0).is_err());
        assert!(validate_line_count(1).is_ok());
        assert!(validate_line_count(MAX_DOC_LINES + 1).is_err());
    }

    #[test]
    fn test_attachment_types() {
        assert_eq!(validate_attachment("foto.jpeg", 10).unwrap(), "image/jpeg");
        assert_eq!(validate_attachment("precios.csv", 10).unwrap(), "text/csv");
        assert!(validate_attachment("sin_extension", 10).is_err());
        assert!(validate_attachment("grande.pdf", MAX_BLOB_SIZE + 1).is_err());
        assert!(validate_attachment("limite.pdf", MAX_BLOB_SIZE).is_ok());
    }

    #[test]
    fn test_username_and_password() {
        assert_eq!(validate_username(" Ana.Perez ").unwrap(), "Ana.Perez");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("ana perez").is_err());
        assert!(validate_password("corta").is_err());
        assert!(validate_password("suficiente").is_ok());
    }
}
