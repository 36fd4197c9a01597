use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{DomainError, DomainResult, Entity, InvoiceId, Money, PaymentId, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Online,
    Qr,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Online => "ONLINE",
            PaymentMethod::Qr => "QR",
        }
    }
}

impl core::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "ONLINE" => Ok(PaymentMethod::Online),
            "QR" => Ok(PaymentMethod::Qr),
            other => Err(DomainError::validation(
                "payment_method",
                format!("unknown payment method '{other}'"),
            )),
        }
    }
}

/// An immutable, append-only payment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
    pub received_by: Option<UserId>,
    pub paid_at: DateTime<Utc>,
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> PaymentId {
        self.id
    }
}

/// Client request to record a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Money) -> Self {
        Self {
            amount,
            payment_method: PaymentMethod::Cash,
            transaction_id: None,
            notes: None,
        }
    }

    pub fn validated(self) -> DomainResult<Self> {
        if !self.amount.is_positive() {
            return Err(DomainError::validation(
                "amount",
                "payment amount must be greater than zero",
            ));
        }
        Ok(Self {
            transaction_id: non_blank(self.transaction_id),
            notes: non_blank(self.notes),
            ..self
        })
    }

    pub fn into_payment(
        self,
        id: PaymentId,
        invoice_id: InvoiceId,
        received_by: UserId,
        now: DateTime<Utc>,
    ) -> Payment {
        Payment {
            id,
            invoice_id,
            amount: self.amount,
            payment_method: self.payment_method,
            transaction_id: self.transaction_id,
            notes: self.notes,
            received_by: Some(received_by),
            paid_at: now,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
