use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{AggregateRoot, BranchId, DomainError, DomainResult, InvoiceId, Money, UserId};

use crate::patch::InvoicePatch;

/// Settlement state of an invoice.
///
/// Apart from `Cancelled`, this is always derived from `(paid_amount, total_amount)`
/// and never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    /// Status implied by the amounts of a non-cancelled invoice.
    pub fn derive(paid: Money, total: Money) -> Self {
        if paid.is_zero() {
            PaymentStatus::Unpaid
        } else if paid < total {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        }
    }

    /// `Paid` and `Cancelled` invoices only accept administrative changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            "PARTIAL" => Ok(PaymentStatus::Partial),
            "PAID" => Ok(PaymentStatus::Paid),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(DomainError::validation(
                "payment_status",
                format!("unknown payment status '{other}'"),
            )),
        }
    }
}

/// Kitchen workflow state, independent of settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Served,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Served => "SERVED",
        }
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "READY" => Ok(OrderStatus::Ready),
            "SERVED" => Ok(OrderStatus::Served),
            other => Err(DomainError::validation(
                "order_status",
                format!("unknown order status '{other}'"),
            )),
        }
    }
}

/// Everything needed to open an invoice except its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub branch_id: BranchId,
    pub invoice_number: String,
    pub tax_amount: Money,
    pub discount: Money,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<UserId>,
    pub served_by: Option<UserId>,
}

/// Flat persisted shape of an invoice, used to rehydrate from a store row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub branch_id: BranchId,
    pub invoice_number: String,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub served_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Aggregate root: Invoice.
///
/// Owns its items and payments. The invariants kept here:
/// - `total_amount = subtotal + tax_amount - discount`
/// - `0 <= paid_amount <= total_amount`, and `paid_amount` never decreases
/// - `payment_status` is [`PaymentStatus::derive`] of the amounts unless cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    branch_id: BranchId,
    invoice_number: String,
    subtotal: Money,
    tax_amount: Money,
    discount: Money,
    total_amount: Money,
    paid_amount: Money,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    notes: Option<String>,
    description: Option<String>,
    is_active: bool,
    created_by: Option<UserId>,
    served_by: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Store row version; never leaves the process.
    #[serde(skip)]
    version: u64,
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// `subtotal + tax - discount`, validating the adjustments.
pub fn compute_total(subtotal: Money, tax: Money, discount: Money) -> DomainResult<Money> {
    if tax.minor() < 0 {
        return Err(DomainError::validation("tax_amount", "tax cannot be negative"));
    }
    if discount.minor() < 0 {
        return Err(DomainError::validation("discount", "discount cannot be negative"));
    }
    let gross = subtotal
        .checked_add(tax)
        .ok_or_else(|| DomainError::validation("tax_amount", "amount out of range"))?;
    if discount > gross {
        return Err(DomainError::validation(
            "discount",
            "discount cannot exceed subtotal plus tax",
        ));
    }
    Ok(gross - discount)
}

/// Invoice number used when the client does not supply one.
pub fn default_invoice_number(id: InvoiceId, at: DateTime<Utc>) -> String {
    format!("INV-{}-{:06}", at.format("%Y%m%d"), id.get())
}

impl Invoice {
    /// Open a new, unpaid invoice over lines worth `subtotal`.
    pub fn open(
        id: InvoiceId,
        draft: InvoiceDraft,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let invoice_number = draft.invoice_number.trim().to_string();
        if invoice_number.is_empty() {
            return Err(DomainError::validation(
                "invoice_number",
                "invoice number cannot be empty",
            ));
        }
        let total_amount = compute_total(subtotal, draft.tax_amount, draft.discount)?;

        Ok(Self {
            id,
            branch_id: draft.branch_id,
            invoice_number,
            subtotal,
            tax_amount: draft.tax_amount,
            discount: draft.discount,
            total_amount,
            paid_amount: Money::ZERO,
            payment_status: PaymentStatus::Unpaid,
            order_status: OrderStatus::Pending,
            notes: draft.notes,
            description: draft.description,
            is_active: true,
            created_by: draft.created_by,
            served_by: draft.served_by,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Rehydrate from a stored row, refusing rows that break the invariants.
    pub fn restore(record: InvoiceRecord) -> DomainResult<Self> {
        let expected_total = compute_total(record.subtotal, record.tax_amount, record.discount)?;
        if expected_total != record.total_amount {
            return Err(DomainError::state_conflict(format!(
                "invoice {} total does not match its components",
                record.id
            )));
        }
        if record.paid_amount.minor() < 0 || record.paid_amount > record.total_amount {
            return Err(DomainError::state_conflict(format!(
                "invoice {} paid amount is out of range",
                record.id
            )));
        }
        if record.payment_status != PaymentStatus::Cancelled
            && record.payment_status
                != PaymentStatus::derive(record.paid_amount, record.total_amount)
        {
            return Err(DomainError::state_conflict(format!(
                "invoice {} status does not match its amounts",
                record.id
            )));
        }

        Ok(Self {
            id: record.id,
            branch_id: record.branch_id,
            invoice_number: record.invoice_number,
            subtotal: record.subtotal,
            tax_amount: record.tax_amount,
            discount: record.discount,
            total_amount: record.total_amount,
            paid_amount: record.paid_amount,
            payment_status: record.payment_status,
            order_status: record.order_status,
            notes: record.notes,
            description: record.description,
            is_active: record.is_active,
            created_by: record.created_by,
            served_by: record.served_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
        })
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn due_amount(&self) -> Money {
        self.total_amount.saturating_sub(self.paid_amount)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn order_status(&self) -> OrderStatus {
        self.order_status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn served_by(&self) -> Option<UserId> {
        self.served_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Set by the store once an update is committed.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Reject changes to settled or cancelled invoices.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.payment_status.is_terminal() {
            return Err(DomainError::state_conflict(format!(
                "cannot modify {} invoice",
                self.payment_status
            )));
        }
        Ok(())
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.payment_status == PaymentStatus::Paid {
            return Err(DomainError::state_conflict("cannot delete a paid invoice"));
        }
        Ok(())
    }

    /// Check whether a payment of `amount` may be applied right now.
    pub fn check_payment(&self, amount: Money) -> DomainResult<()> {
        if !amount.is_positive() {
            return Err(DomainError::validation(
                "amount",
                "payment amount must be greater than zero",
            ));
        }
        match self.payment_status {
            PaymentStatus::Cancelled => {
                return Err(DomainError::state_conflict(
                    "cannot register payment on a cancelled invoice",
                ));
            }
            PaymentStatus::Paid => {
                return Err(DomainError::state_conflict("invoice is already fully paid"));
            }
            PaymentStatus::Unpaid | PaymentStatus::Partial => {}
        }
        let due = self.due_amount();
        if amount > due {
            return Err(DomainError::state_conflict(format!(
                "payment exceeds due amount ({amount} > {due})"
            )));
        }
        Ok(())
    }

    /// Apply a payment, re-deriving the status.
    pub fn record_payment(&mut self, amount: Money, now: DateTime<Utc>) -> DomainResult<()> {
        self.check_payment(amount)?;
        self.paid_amount += amount;
        self.payment_status = PaymentStatus::derive(self.paid_amount, self.total_amount);
        self.updated_at = now;
        Ok(())
    }

    /// Replace the line subtotal after items were attached or detached.
    pub fn set_subtotal(&mut self, subtotal: Money, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_mutable()?;
        self.reprice(subtotal, self.tax_amount, self.discount)?;
        self.updated_at = now;
        Ok(())
    }

    /// Apply an allow-listed patch. Permission to touch pricing is checked by
    /// the caller; this only enforces state and amount rules.
    pub fn apply_patch(&mut self, patch: &InvoicePatch, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_mutable()?;
        if patch.touches_pricing() {
            let tax = patch.tax_amount.unwrap_or(self.tax_amount);
            let discount = patch.discount.unwrap_or(self.discount);
            self.reprice(self.subtotal, tax, discount)?;
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(order_status) = patch.order_status {
            self.order_status = order_status;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Administrative cancellation. Collected money stays recorded.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_mutable()?;
        self.payment_status = PaymentStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    fn reprice(&mut self, subtotal: Money, tax: Money, discount: Money) -> DomainResult<()> {
        let total = compute_total(subtotal, tax, discount)?;
        if total < self.paid_amount {
            return Err(DomainError::state_conflict(format!(
                "new total {total} would fall below the paid amount {}",
                self.paid_amount
            )));
        }
        self.subtotal = subtotal;
        self.tax_amount = tax;
        self.discount = discount;
        self.total_amount = total;
        self.payment_status = PaymentStatus::derive(self.paid_amount, self.total_amount);
        Ok(())
    }
}
