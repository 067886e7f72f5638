//! # Operation Inputs
//!
//! Request shapes for catalog, identity and document operations.
//!
//! Each input has a `validate(self)` that checks the field contracts and
//! returns a normalized copy (trimmed text, canonical document numbers,
//! digit-only phones). Repositories persist only validated inputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cart::{CartLine, SaleCart};
use crate::error::{CoreResult, ValidationError};
use crate::types::{Currency, DocumentType, IdDocType, Sex};
use crate::validation::{
    validate_article_code, validate_category_description, validate_category_name,
    validate_doc_number, validate_email, validate_line_count, validate_optional_text,
    validate_phone, validate_price_cents, validate_quantity, validate_text, validate_username,
    validate_vat_pct,
};

fn optional_phone(phone: Option<String>) -> CoreResult<Option<String>> {
    match phone.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) => Ok(Some(validate_phone(p)?)),
    }
}

fn optional_email(email: Option<String>) -> CoreResult<Option<String>> {
    match email.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(e) => Ok(Some(validate_email(e)?)),
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

impl CategoryInput {
    pub fn validate(self) -> CoreResult<Self> {
        Ok(CategoryInput {
            name: validate_category_name(&self.name)?,
            description: validate_category_description(self.description.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleInput {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub presentation_id: i64,
    pub sale_price_cents: i64,
    pub reference_price_cents: Option<i64>,
    pub is_weighed: bool,
    pub price_per_kg_cents: Option<i64>,
    pub plu: Option<String>,
    pub barcode: Option<String>,
    pub image: Option<String>,
}

impl ArticleInput {
    /// A minimal unit-priced article.
    pub fn simple(
        code: impl Into<String>,
        name: impl Into<String>,
        category_id: i64,
        presentation_id: i64,
        sale_price_cents: i64,
    ) -> Self {
        ArticleInput {
            code: code.into(),
            name: name.into(),
            description: None,
            category_id,
            presentation_id,
            sale_price_cents,
            reference_price_cents: None,
            is_weighed: false,
            price_per_kg_cents: None,
            plu: None,
            barcode: None,
            image: None,
        }
    }

    /// ## Rules
    /// - code: letters, digits, `-`, `_`; at most 50
    /// - name: required, at most 100
    /// - prices not negative
    /// - weighed articles carry a price per kg
    pub fn validate(self) -> CoreResult<Self> {
        validate_price_cents("sale_price", self.sale_price_cents)?;
        if let Some(reference) = self.reference_price_cents {
            validate_price_cents("reference_price", reference)?;
        }

        let price_per_kg_cents = match (self.is_weighed, self.price_per_kg_cents) {
            (true, None) => return Err(ValidationError::required("price_per_kg").into()),
            (true, Some(p)) => {
                validate_price_cents("price_per_kg", p)?;
                Some(p)
            }
            (false, p) => p,
        };

        Ok(ArticleInput {
            code: validate_article_code(&self.code)?,
            name: validate_text("name", &self.name, 100)?,
            description: validate_optional_text("description", self.description.as_deref(), 256)?,
            category_id: self.category_id,
            presentation_id: self.presentation_id,
            sale_price_cents: self.sale_price_cents,
            reference_price_cents: self.reference_price_cents,
            is_weighed: self.is_weighed,
            price_per_kg_cents,
            plu: validate_optional_text("plu", self.plu.as_deref(), 20)?,
            barcode: validate_optional_text("barcode", self.barcode.as_deref(), 50)?,
            image: validate_optional_text("image", self.image.as_deref(), 256)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierInput {
    pub trade_name: String,
    pub sector: String,
    pub doc_type: IdDocType,
    pub doc_number: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl SupplierInput {
    pub fn validate(self) -> CoreResult<Self> {
        Ok(SupplierInput {
            trade_name: validate_text("trade_name", &self.trade_name, 100)?,
            sector: validate_text("sector", &self.sector, 50)?,
            doc_number: validate_doc_number(self.doc_type, &self.doc_number)?,
            doc_type: self.doc_type,
            contact_name: validate_optional_text(
                "contact_name",
                self.contact_name.as_deref(),
                100,
            )?,
            phone: optional_phone(self.phone)?,
            email: optional_email(self.email)?,
            address: validate_optional_text("address", self.address.as_deref(), 256)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInput {
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

impl ClientInput {
    pub fn validate(self) -> CoreResult<Self> {
        Ok(ClientInput {
            name: validate_text("name", &self.name, 50)?,
            surname: validate_text("surname", &self.surname, 50)?,
            sex: self.sex,
            birth_date: self.birth_date,
            doc_number: validate_doc_number(self.doc_type, &self.doc_number)?,
            doc_type: self.doc_type,
            phone: optional_phone(self.phone)?,
            email: optional_email(self.email)?,
            address: validate_optional_text("address", self.address.as_deref(), 256)?,
        })
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Worker profile fields. The password and the role travel separately
/// (`change_password`, `assign_role`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInput {
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
}

impl WorkerInput {
    pub fn validate(self) -> CoreResult<Self> {
        Ok(WorkerInput {
            name: validate_text("name", &self.name, 50)?,
            surname: validate_text("surname", &self.surname, 50)?,
            sex: self.sex,
            birth_date: self.birth_date,
            doc_number: validate_doc_number(self.doc_type, &self.doc_number)?,
            doc_type: self.doc_type,
            phone: optional_phone(self.phone)?,
            address: validate_optional_text("address", self.address.as_deref(), 256)?,
            username: validate_username(&self.username)?,
            email: validate_email(&self.email)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInput {
    pub name: String,
    pub description: Option<String>,
    pub level: i64,
    pub active: bool,
}

impl RoleInput {
    pub fn validate(self) -> CoreResult<Self> {
        if self.level < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "level".to_string(),
            }
            .into());
        }
        Ok(RoleInput {
            name: validate_text("name", &self.name, 50)?,
            description: validate_optional_text("description", self.description.as_deref(), 256)?,
            level: self.level,
            active: self.active,
        })
    }
}

// =============================================================================
// Documents
// =============================================================================

/// One delivered line. Unit price may be zero (free samples).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingLineInput {
    pub article_id: i64,
    pub qty: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingInput {
    pub worker_id: i64,
    pub supplier_id: i64,
    pub doc_type: DocumentType,
    pub series: String,
    pub number: String,
    pub vat_pct: f64,
    pub lines: Vec<IncomingLineInput>,
}

impl IncomingInput {
    pub fn validate(self) -> CoreResult<Self> {
        validate_vat_pct(self.vat_pct)?;
        validate_line_count(self.lines.len())?;
        for line in &self.lines {
            validate_quantity(line.qty)?;
            validate_price_cents("unit_price", line.unit_price_cents)?;
        }

        Ok(IncomingInput {
            series: validate_text("series", &self.series, 20)?,
            number: validate_text("number", &self.number, 20)?,
            ..self
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleInput {
    pub worker_id: i64,
    pub client_id: Option<i64>,
    pub doc_type: DocumentType,
    pub series: String,
    pub number: String,
    pub vat_pct: f64,
    pub payment_ccy: Currency,
    pub lines: Vec<CartLine>,
}

impl SaleInput {
    /// Checks header fields and builds the cart, which checks each line.
    pub fn validate(self) -> CoreResult<(Self, SaleCart)> {
        let series = validate_text("series", &self.series, 20)?;
        let number = validate_text("number", &self.number, 20)?;
        validate_vat_pct(self.vat_pct)?;
        validate_line_count(self.lines.len())?;

        let mut cart = SaleCart::new(self.vat_pct);
        for line in &self.lines {
            cart.add_line(*line)?;
        }
        cart.validate()?;

        Ok((
            SaleInput {
                series,
                number,
                ..self
            },
            cart,
        ))
    }
}
