//! Engine inputs.
//!
//! These are transport-neutral: the API deserializes request bodies straight
//! into them.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{BranchId, Money, UserId};
use posledger_invoicing::{Invoice, ItemRequest, Payment, PaymentStatus};

use crate::ledger_store::InvoiceFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    /// Required for global callers; branch-bound callers default to their own.
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    pub items: Vec<ItemRequest>,
    /// Generated when absent.
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tax_amount: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub served_by: Option<UserId>,
}

impl CreateInvoice {
    pub fn new(items: Vec<ItemRequest>) -> Self {
        Self {
            branch_id: None,
            items,
            invoice_number: None,
            notes: None,
            description: None,
            tax_amount: Money::ZERO,
            discount: Money::ZERO,
            served_by: None,
        }
    }

    pub fn in_branch(mut self, branch: BranchId) -> Self {
        self.branch_id = Some(branch);
        self
    }

    pub fn touches_pricing(&self) -> bool {
        !self.tax_amount.is_zero() || !self.discount.is_zero()
    }
}

/// List filters accepted from clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceQuery {
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    /// First day included (UTC).
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    /// Last day included (UTC).
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl InvoiceQuery {
    pub fn has_dates(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }

    /// Restrict to a single day.
    pub fn on(day: NaiveDate) -> Self {
        Self {
            date_from: Some(day),
            date_to: Some(day),
            ..Self::default()
        }
    }

    pub(crate) fn to_filter(&self, branch: Option<BranchId>) -> InvoiceFilter {
        let mut filter = InvoiceFilter::all()
            .branch(branch)
            .status(self.status)
            .limit(self.limit);
        filter.created_from = self.date_from.map(start_of_day);
        filter.created_before = self
            .date_to
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(start_of_day);
        filter
    }
}

pub(crate) fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// Result of a recorded payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub invoice: Invoice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_range_is_half_open() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let filter = InvoiceQuery::on(day).to_filter(None);
        assert_eq!(filter.created_from, Some(start_of_day(day)));
        assert_eq!(
            filter.created_before,
            Some(start_of_day(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()))
        );
    }

    #[test]
    fn create_defaults_to_no_adjustments() {
        let body = r#"{"items":[{"product_id":1,"quantity":2}]}"#;
        let cmd: CreateInvoice = serde_json::from_str(body).unwrap();
        assert_eq!(cmd.branch_id, None);
        assert!(!cmd.touches_pricing());
    }
}
