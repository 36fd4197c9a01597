use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId, Money, ProductId};

/// A line on an invoice. The unit price is captured when the line is attached
/// so later menu price changes never alter issued invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub created_at: DateTime<Utc>,
}

impl Entity for InvoiceItem {
    type Id = InvoiceItemId;

    fn id(&self) -> InvoiceItemId {
        self.id
    }
}

impl InvoiceItem {
    pub fn new(
        id: InvoiceItemId,
        invoice_id: InvoiceId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity", "quantity must be at least 1"));
        }
        let line_total = unit_price
            .checked_mul(quantity)
            .ok_or_else(|| DomainError::validation("quantity", "line total out of range"))?;
        Ok(Self {
            id,
            invoice_id,
            product_id,
            quantity,
            unit_price,
            line_total,
            created_at: now,
        })
    }
}

/// Client request for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Sum of line totals; an out-of-range sum is a validation error on `items`.
pub fn subtotal<'a>(items: impl IntoIterator<Item = &'a InvoiceItem>) -> DomainResult<Money> {
    items.into_iter().try_fold(Money::ZERO, |acc, item| {
        acc.checked_add(item.line_total)
            .ok_or_else(|| DomainError::validation("items", "invoice subtotal out of range"))
    })
}
