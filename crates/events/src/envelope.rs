use serde::{Deserialize, Serialize};

use posledger_core::InvoiceId;

use crate::ChangeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEventType {
    InvoiceCreated,
    InvoiceUpdated,
}

/// Wire message pushed to live feed clients:
/// `{"type": "invoice_created" | "invoice_updated", "invoice_id": 12, "status"?: "PAID"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    pub event_type: PushEventType,
    pub invoice_id: InvoiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl PushEnvelope {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&ChangeEvent> for PushEnvelope {
    fn from(change: &ChangeEvent) -> Self {
        if change.is_invoice_creation() {
            Self {
                event_type: PushEventType::InvoiceCreated,
                invoice_id: change.invoice_id,
                status: None,
            }
        } else {
            Self {
                event_type: PushEventType::InvoiceUpdated,
                invoice_id: change.invoice_id,
                status: change.status.map(|s| s.as_str().to_string()),
            }
        }
    }
}
