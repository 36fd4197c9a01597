use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{BranchId, InvoiceId};
use posledger_invoicing::{Invoice, PaymentStatus};

/// Which ledger record a committed change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Invoice,
    InvoiceItem,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A committed change, as handed to the hub after the transaction commits.
///
/// Facts only: it never carries uncommitted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub change: ChangeKind,
    pub invoice_id: InvoiceId,
    pub branch_id: BranchId,
    /// Settlement status after the change (absent once the invoice is gone).
    pub status: Option<PaymentStatus>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// A change that leaves `invoice` in place.
    pub fn on_invoice(
        entity: EntityKind,
        change: ChangeKind,
        invoice: &Invoice,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity,
            change,
            invoice_id: invoice.id_typed(),
            branch_id: invoice.branch_id(),
            status: Some(invoice.payment_status()),
            occurred_at,
        }
    }

    pub fn invoice_deleted(
        invoice_id: InvoiceId,
        branch_id: BranchId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity: EntityKind::Invoice,
            change: ChangeKind::Deleted,
            invoice_id,
            branch_id,
            status: None,
            occurred_at,
        }
    }

    /// Only a freshly created invoice is announced as "created"; every other
    /// change (items, payments, patches, deletes) is an update of that invoice.
    pub fn is_invoice_creation(&self) -> bool {
        self.entity == EntityKind::Invoice && self.change == ChangeKind::Created
    }
}
