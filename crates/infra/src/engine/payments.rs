use chrono::Utc;
use tracing::{info, instrument};

use posledger_auth::{authorize, AccessDecision, Caller, Operation};
use posledger_core::{InvoiceId, PaymentId, UserId};
use posledger_events::{ChangeEvent, ChangeKind, EntityKind, Notifier};
use posledger_invoicing::{Payment, PaymentRequest};

use super::{finish, visible, EngineError, EngineResult, InvoiceEngine, PaymentReceipt};
use crate::ledger_store::{IdKind, LedgerStore};

impl<S, N> InvoiceEngine<S, N>
where
    S: LedgerStore,
    N: Notifier,
{
    /// Record a payment against an invoice.
    ///
    /// The over-payment check runs against the `paid_amount` read inside the
    /// transaction, so two concurrent payments can never both pass it.
    #[instrument(
        skip(self, caller, request),
        fields(user_id = %caller.user_id, invoice_id = %id, amount = %request.amount),
        err
    )]
    pub async fn add_payment(
        &self,
        caller: &Caller,
        id: InvoiceId,
        request: PaymentRequest,
    ) -> EngineResult<PaymentReceipt> {
        let decision = authorize(caller, Operation::CreatePayment)?;
        let request = request.validated()?;

        let receipt = self
            .retrying("add_payment", || {
                self.try_add_payment(decision, caller.user_id, id, &request)
            })
            .await?;
        info!(
            invoice_id = %id,
            payment_id = %receipt.payment.id,
            amount = %receipt.payment.amount,
            method = receipt.payment.payment_method.as_str(),
            status = %receipt.invoice.payment_status(),
            "payment recorded"
        );
        Ok(receipt)
    }

    async fn try_add_payment(
        &self,
        decision: AccessDecision,
        received_by: UserId,
        id: InvoiceId,
        request: &PaymentRequest,
    ) -> EngineResult<PaymentReceipt> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = async {
            let mut invoice = visible(decision, id, tx.invoice_for_update(id).await?)?;
            invoice.record_payment(request.amount, now)?;
            tx.update_invoice(&mut invoice).await?;

            let payment_id = PaymentId::new(tx.allocate_id(IdKind::Payment).await?);
            let payment = request.clone().into_payment(payment_id, id, received_by, now);
            tx.insert_payment(&payment).await?;
            Ok::<_, EngineError>(PaymentReceipt { payment, invoice })
        }
        .await;
        let receipt = finish(tx, staged).await?;
        self.announce(ChangeEvent::on_invoice(
            EntityKind::Payment,
            ChangeKind::Created,
            &receipt.invoice,
            now,
        ));
        Ok(receipt)
    }

    /// Payments of a visible invoice, oldest first.
    pub async fn list_payments(&self, caller: &Caller, id: InvoiceId) -> EngineResult<Vec<Payment>> {
        let decision = authorize(caller, Operation::ReadPayment)?;
        match self.store.invoice_detail(id).await? {
            Some(detail) if decision.permits(detail.invoice.branch_id()) => {
                let mut payments = detail.payments;
                payments.sort_by_key(|p| (p.paid_at, p.id));
                Ok(payments)
            }
            _ => Err(EngineError::not_found(format!("invoice {id}"))),
        }
    }
}
