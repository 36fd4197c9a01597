use serde::Serialize;

/// Operations guarded by the access policy.
///
/// Every ledger read/write and every realtime subscription names exactly one
/// of these before it touches data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ReadInvoice,
    /// Create an invoice or attach items to an open one.
    CreateInvoice,
    /// Patch allow-listed fields or detach items.
    UpdateInvoice,
    CancelInvoice,
    DeleteInvoice,
    /// Change tax/discount on an invoice.
    AdjustPricing,
    ReadPayment,
    CreatePayment,
    ViewDashboard,
    SubscribeFeed,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::ReadInvoice,
        Operation::CreateInvoice,
        Operation::UpdateInvoice,
        Operation::CancelInvoice,
        Operation::DeleteInvoice,
        Operation::AdjustPricing,
        Operation::ReadPayment,
        Operation::CreatePayment,
        Operation::ViewDashboard,
        Operation::SubscribeFeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ReadInvoice => "invoice.read",
            Operation::CreateInvoice => "invoice.create",
            Operation::UpdateInvoice => "invoice.update",
            Operation::CancelInvoice => "invoice.cancel",
            Operation::DeleteInvoice => "invoice.delete",
            Operation::AdjustPricing => "invoice.pricing",
            Operation::ReadPayment => "payment.read",
            Operation::CreatePayment => "payment.create",
            Operation::ViewDashboard => "dashboard.view",
            Operation::SubscribeFeed => "feed.subscribe",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
