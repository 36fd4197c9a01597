//! Read-side filters and aggregates over committed invoices.

use chrono::{DateTime, Utc};
use serde::Serialize;

use posledger_core::{BranchId, InvoiceId, Money, ProductId};
use posledger_invoicing::{Invoice, PaymentStatus};

/// Equality/range predicates over invoices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub branch_id: Option<BranchId>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub payment_status: Option<PaymentStatus>,
    /// Leave cancelled invoices out (sales figures).
    pub exclude_cancelled: bool,
    pub limit: Option<u32>,
}

impl InvoiceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn branch(mut self, branch: Option<BranchId>) -> Self {
        self.branch_id = branch;
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_before = Some(before);
        self
    }

    pub fn status(mut self, status: Option<PaymentStatus>) -> Self {
        self.payment_status = status;
        self
    }

    pub fn sales_only(mut self) -> Self {
        self.exclude_cancelled = true;
        self
    }

    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(branch) = self.branch_id {
            if invoice.branch_id() != branch {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if invoice.created_at() < from {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if invoice.created_at() >= before {
                return false;
            }
        }
        if let Some(status) = self.payment_status {
            if invoice.payment_status() != status {
                return false;
            }
        }
        if self.exclude_cancelled && invoice.payment_status() == PaymentStatus::Cancelled {
            return false;
        }
        true
    }
}

/// Sum/count aggregate over matching invoices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub count: u64,
    pub total_amount: Money,
    pub paid_amount: Money,
}

impl InvoiceTotals {
    pub fn add(&mut self, invoice: &Invoice) {
        self.count += 1;
        self.total_amount = self.total_amount.saturating_add(invoice.total_amount());
        self.paid_amount = self.paid_amount.saturating_add(invoice.paid_amount());
    }

    /// Mean invoice value, zero when there are none.
    pub fn average(&self) -> Money {
        if self.count == 0 {
            return Money::ZERO;
        }
        let count = i64::try_from(self.count).unwrap_or(i64::MAX);
        Money::from_minor(self.total_amount.minor() / count)
    }
}

/// One invoice line joined with its product and category names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesLine {
    pub invoice_id: InvoiceId,
    pub branch_id: BranchId,
    pub product_id: ProductId,
    pub product_name: String,
    pub category_name: String,
    pub quantity: u32,
    pub line_total: Money,
    /// `created_at` of the owning invoice.
    pub ordered_at: DateTime<Utc>,
}
