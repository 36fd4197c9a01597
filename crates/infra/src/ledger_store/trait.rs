use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use posledger_catalog::{
    Branch, NewBranch, NewProduct, NewProductCategory, NewStaffMember, Product, ProductCategory,
    StaffMember,
};
use posledger_core::{BranchId, InvoiceId, InvoiceItemId, ProductId};
use posledger_invoicing::{Invoice, InvoiceDetail, InvoiceItem, Payment};

use super::query::{InvoiceFilter, InvoiceTotals, SalesLine};

/// Ledger store operation error.
///
/// These are **infrastructure errors** (concurrency, constraints, availability)
/// as opposed to domain errors (validation, state rules).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent transaction changed rows this one depends on. The whole
    /// operation may be retried.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("duplicate value for `{field}`: {message}")]
    UniqueViolation { field: &'static str, message: String },

    #[error("invalid reference in `{field}`: {message}")]
    InvalidReference { field: &'static str, message: String },

    /// A stored row failed to rehydrate.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Row kinds whose ids are allocated inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Invoice,
    InvoiceItem,
    Payment,
}

/// One ledger transaction.
///
/// Everything written through a transaction becomes visible atomically on
/// `commit`, or not at all. Dropping a transaction without committing rolls
/// it back.
#[async_trait]
pub trait LedgerTx: Send {
    async fn allocate_id(&mut self, kind: IdKind) -> Result<i64, StoreError>;

    async fn branch(&mut self, id: BranchId) -> Result<Option<Branch>, StoreError>;

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Read an invoice and hold it against concurrent writers until this
    /// transaction ends (row lock or commit-time version validation).
    async fn invoice_for_update(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    async fn invoice_number_exists(&mut self, number: &str) -> Result<bool, StoreError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Persist changes to an invoice previously read in this transaction and
    /// bump its version.
    async fn update_invoice(&mut self, invoice: &mut Invoice) -> Result<(), StoreError>;

    /// Delete an invoice with its items and payments.
    async fn delete_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn items(&mut self, invoice: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError>;

    async fn insert_item(&mut self, item: &InvoiceItem) -> Result<(), StoreError>;

    async fn delete_item(&mut self, item: InvoiceItemId) -> Result<(), StoreError>;

    async fn payments(&mut self, invoice: InvoiceId) -> Result<Vec<Payment>, StoreError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional relational store behind the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    // ── committed reads ──────────────────────────────────────────────────────

    async fn invoice_detail(&self, id: InvoiceId) -> Result<Option<InvoiceDetail>, StoreError>;

    /// Invoices matching `filter`, newest first.
    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError>;

    async fn invoice_totals(&self, filter: &InvoiceFilter) -> Result<InvoiceTotals, StoreError>;

    /// Item lines of the invoices matching `filter`, joined with product and
    /// category names.
    async fn sales_lines(&self, filter: &InvoiceFilter) -> Result<Vec<SalesLine>, StoreError>;

    async fn count_branches(&self) -> Result<u64, StoreError>;

    async fn count_staff(&self) -> Result<u64, StoreError>;

    // ── catalog (seeding) ────────────────────────────────────────────────────

    /// Branch names are unique case-insensitively.
    async fn create_branch(&self, new: NewBranch) -> Result<Branch, StoreError>;

    async fn create_category(&self, new: NewProductCategory)
    -> Result<ProductCategory, StoreError>;

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError>;

    async fn register_staff(&self, new: NewStaffMember) -> Result<StaffMember, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        (**self).begin().await
    }

    async fn invoice_detail(&self, id: InvoiceId) -> Result<Option<InvoiceDetail>, StoreError> {
        (**self).invoice_detail(id).await
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError> {
        (**self).list_invoices(filter).await
    }

    async fn invoice_totals(&self, filter: &InvoiceFilter) -> Result<InvoiceTotals, StoreError> {
        (**self).invoice_totals(filter).await
    }

    async fn sales_lines(&self, filter: &InvoiceFilter) -> Result<Vec<SalesLine>, StoreError> {
        (**self).sales_lines(filter).await
    }

    async fn count_branches(&self) -> Result<u64, StoreError> {
        (**self).count_branches().await
    }

    async fn count_staff(&self) -> Result<u64, StoreError> {
        (**self).count_staff().await
    }

    async fn create_branch(&self, new: NewBranch) -> Result<Branch, StoreError> {
        (**self).create_branch(new).await
    }

    async fn create_category(
        &self,
        new: NewProductCategory,
    ) -> Result<ProductCategory, StoreError> {
        (**self).create_category(new).await
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        (**self).create_product(new).await
    }

    async fn register_staff(&self, new: NewStaffMember) -> Result<StaffMember, StoreError> {
        (**self).register_staff(new).await
    }
}
