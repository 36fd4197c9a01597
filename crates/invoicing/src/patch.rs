use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use posledger_core::{DomainError, DomainResult, Money};

use crate::OrderStatus;

/// Fields any invoice editor may change.
pub const WRITABLE_FIELDS: &[&str] = &["notes", "description", "is_active", "order_status"];

/// Fields that additionally require pricing rights.
pub const PRICING_FIELDS: &[&str] = &["tax_amount", "discount"];

/// A partial update restricted to the allow-list.
///
/// `Some(None)` on a text field clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoicePatch {
    pub notes: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub order_status: Option<OrderStatus>,
    pub tax_amount: Option<Money>,
    pub discount: Option<Money>,
}

impl InvoicePatch {
    /// Build a patch from a raw JSON object, rejecting anything outside the
    /// allow-list.
    pub fn from_fields(fields: &Map<String, Value>) -> DomainResult<Self> {
        if fields.is_empty() {
            return Err(DomainError::validation("body", "no writable fields supplied"));
        }

        let mut patch = InvoicePatch::default();
        for (key, value) in fields {
            match key.as_str() {
                "notes" => patch.notes = Some(parse(key, value)?),
                "description" => patch.description = Some(parse(key, value)?),
                "is_active" => patch.is_active = Some(parse(key, value)?),
                "order_status" => patch.order_status = Some(parse(key, value)?),
                "tax_amount" => patch.tax_amount = Some(parse(key, value)?),
                "discount" => patch.discount = Some(parse(key, value)?),
                other => {
                    return Err(DomainError::validation(
                        other,
                        format!(
                            "field is not writable; allowed: {}",
                            [WRITABLE_FIELDS, PRICING_FIELDS].concat().join(", ")
                        ),
                    ));
                }
            }
        }
        Ok(patch)
    }

    pub fn touches_pricing(&self) -> bool {
        self.tax_amount.is_some() || self.discount.is_some()
    }

    /// Names of the fields this patch sets, for logging.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.notes.is_some() {
            names.push("notes");
        }
        if self.description.is_some() {
            names.push("description");
        }
        if self.is_active.is_some() {
            names.push("is_active");
        }
        if self.order_status.is_some() {
            names.push("order_status");
        }
        if self.tax_amount.is_some() {
            names.push("tax_amount");
        }
        if self.discount.is_some() {
            names.push("discount");
        }
        names
    }
}

fn parse<T: DeserializeOwned>(field: &str, value: &Value) -> DomainResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| DomainError::validation(field, format!("invalid value: {e}")))
}
