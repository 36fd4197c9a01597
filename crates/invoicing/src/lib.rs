//! `posledger-invoicing`: invoices, their lines and their payments.
//!
//! Pure rules only: totals, the payment status machine, the patch allow-list.
//! Transactions and persistence are the engine's and the store's business.

pub mod invoice;
pub mod item;
pub mod patch;
pub mod payment;

use serde::Serialize;

pub use invoice::{
    compute_total, default_invoice_number, Invoice, InvoiceDraft, InvoiceRecord, OrderStatus,
    PaymentStatus,
};
pub use item::{subtotal, InvoiceItem, ItemRequest};
pub use patch::{InvoicePatch, PRICING_FIELDS, WRITABLE_FIELDS};
pub use payment::{Payment, PaymentMethod, PaymentRequest};

/// An invoice together with everything it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<Payment>,
}
