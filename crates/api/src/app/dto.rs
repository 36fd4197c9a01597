//! Request bodies and query strings that do not map one-to-one onto engine
//! inputs. `CreateInvoice`, `InvoiceQuery` and `PaymentRequest` are accepted
//! as they are.

use serde::Deserialize;

use posledger_core::BranchId;
use posledger_invoicing::ItemRequest;

#[derive(Debug, Deserialize)]
pub struct AddItemsRequest {
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    #[serde(default)]
    pub branch_id: Option<BranchId>,
}
