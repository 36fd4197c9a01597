use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use posledger_auth::{authorize, AccessDecision, AuthzError, Caller, Operation, Role};
use posledger_core::{BranchId, InvoiceId, InvoiceItemId};
use posledger_events::{ChangeEvent, ChangeKind, EntityKind, Notifier};
use posledger_invoicing::{
    default_invoice_number, subtotal, Invoice, InvoiceDetail, InvoiceDraft, InvoiceItem,
    InvoicePatch, ItemRequest,
};

use super::{finish, visible, CreateInvoice, EngineError, EngineResult, InvoiceEngine, InvoiceQuery};
use crate::ledger_store::{IdKind, LedgerStore, LedgerTx};

impl<S, N> InvoiceEngine<S, N>
where
    S: LedgerStore,
    N: Notifier,
{
    /// Open a new invoice with its lines.
    #[instrument(skip(self, caller, cmd), fields(user_id = %caller.user_id, role = %caller.role), err)]
    pub async fn create_invoice(
        &self,
        caller: &Caller,
        cmd: CreateInvoice,
    ) -> EngineResult<InvoiceDetail> {
        let decision = authorize(caller, Operation::CreateInvoice)?;
        if cmd.touches_pricing() {
            authorize(caller, Operation::AdjustPricing)?;
        }
        let branch = resolve_branch(decision, cmd.branch_id)?;
        if cmd.items.is_empty() {
            return Err(EngineError::validation(
                "items",
                "an invoice needs at least one item",
            ));
        }

        let detail = self
            .retrying("create_invoice", || self.try_create(caller, branch, &cmd))
            .await?;
        info!(
            invoice_id = %detail.invoice.id_typed(),
            branch_id = %branch,
            total = %detail.invoice.total_amount(),
            items = detail.items.len(),
            "invoice created"
        );
        Ok(detail)
    }

    async fn try_create(
        &self,
        caller: &Caller,
        branch: BranchId,
        cmd: &CreateInvoice,
    ) -> EngineResult<InvoiceDetail> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = stage_create(tx.as_mut(), caller, branch, cmd, now).await;
        let detail = finish(tx, staged).await?;
        self.announce(ChangeEvent::on_invoice(
            EntityKind::Invoice,
            ChangeKind::Created,
            &detail.invoice,
            now,
        ));
        Ok(detail)
    }

    /// Apply an allow-listed partial update.
    #[instrument(skip(self, caller, fields), fields(user_id = %caller.user_id, invoice_id = %id), err)]
    pub async fn patch_invoice(
        &self,
        caller: &Caller,
        id: InvoiceId,
        fields: &Map<String, Value>,
    ) -> EngineResult<Invoice> {
        let decision = authorize(caller, Operation::UpdateInvoice)?;
        let patch = InvoicePatch::from_fields(fields)?;
        if patch.touches_pricing() {
            authorize(caller, Operation::AdjustPricing)?;
        }

        let invoice = self
            .retrying("patch_invoice", || self.try_patch(decision, id, &patch))
            .await?;
        info!(
            invoice_id = %id,
            fields = ?patch.field_names(),
            status = %invoice.payment_status(),
            "invoice patched"
        );
        Ok(invoice)
    }

    async fn try_patch(
        &self,
        decision: AccessDecision,
        id: InvoiceId,
        patch: &InvoicePatch,
    ) -> EngineResult<Invoice> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = async {
            let mut invoice = visible(decision, id, tx.invoice_for_update(id).await?)?;
            invoice.apply_patch(patch, now)?;
            tx.update_invoice(&mut invoice).await?;
            Ok::<_, EngineError>(invoice)
        }
        .await;
        let invoice = finish(tx, staged).await?;
        self.announce(ChangeEvent::on_invoice(
            EntityKind::Invoice,
            ChangeKind::Updated,
            &invoice,
            now,
        ));
        Ok(invoice)
    }

    /// Remove an unpaid invoice together with its items and payments.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id, invoice_id = %id), err)]
    pub async fn delete_invoice(&self, caller: &Caller, id: InvoiceId) -> EngineResult<()> {
        let decision = authorize(caller, Operation::DeleteInvoice)?;
        self.retrying("delete_invoice", || self.try_delete(decision, id))
            .await?;
        info!(invoice_id = %id, "invoice deleted");
        Ok(())
    }

    async fn try_delete(&self, decision: AccessDecision, id: InvoiceId) -> EngineResult<()> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = async {
            let invoice = visible(decision, id, tx.invoice_for_update(id).await?)?;
            invoice.ensure_deletable()?;
            tx.delete_invoice(&invoice).await?;
            Ok::<_, EngineError>(invoice.branch_id())
        }
        .await;
        let branch = finish(tx, staged).await?;
        self.announce(ChangeEvent::invoice_deleted(id, branch, now));
        Ok(())
    }

    /// Attach more lines to an open invoice.
    #[instrument(skip(self, caller, items), fields(user_id = %caller.user_id, invoice_id = %id), err)]
    pub async fn add_items(
        &self,
        caller: &Caller,
        id: InvoiceId,
        items: Vec<ItemRequest>,
    ) -> EngineResult<InvoiceDetail> {
        let decision = authorize(caller, Operation::CreateInvoice)?;
        if items.is_empty() {
            return Err(EngineError::validation("items", "no items supplied"));
        }

        let detail = self
            .retrying("add_items", || self.try_add_items(decision, id, &items))
            .await?;
        info!(
            invoice_id = %id,
            added = items.len(),
            total = %detail.invoice.total_amount(),
            "items added"
        );
        Ok(detail)
    }

    async fn try_add_items(
        &self,
        decision: AccessDecision,
        id: InvoiceId,
        requests: &[ItemRequest],
    ) -> EngineResult<InvoiceDetail> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = async {
            let mut invoice = visible(decision, id, tx.invoice_for_update(id).await?)?;
            invoice.ensure_mutable()?;
            let added = price_items(tx.as_mut(), invoice.branch_id(), id, requests, now).await?;
            for item in &added {
                tx.insert_item(item).await?;
            }
            let items = tx.items(id).await?;
            invoice.set_subtotal(subtotal(&items)?, now)?;
            tx.update_invoice(&mut invoice).await?;
            let payments = tx.payments(id).await?;
            Ok::<_, EngineError>(InvoiceDetail {
                invoice,
                items,
                payments,
            })
        }
        .await;
        let detail = finish(tx, staged).await?;
        self.announce(ChangeEvent::on_invoice(
            EntityKind::InvoiceItem,
            ChangeKind::Created,
            &detail.invoice,
            now,
        ));
        Ok(detail)
    }

    /// Detach one line from an open invoice.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id, invoice_id = %id, item_id = %item_id), err)]
    pub async fn remove_item(
        &self,
        caller: &Caller,
        id: InvoiceId,
        item_id: InvoiceItemId,
    ) -> EngineResult<Invoice> {
        let decision = authorize(caller, Operation::UpdateInvoice)?;
        let invoice = self
            .retrying("remove_item", || self.try_remove_item(decision, id, item_id))
            .await?;
        info!(invoice_id = %id, item_id = %item_id, total = %invoice.total_amount(), "item removed");
        Ok(invoice)
    }

    async fn try_remove_item(
        &self,
        decision: AccessDecision,
        id: InvoiceId,
        item_id: InvoiceItemId,
    ) -> EngineResult<Invoice> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = async {
            let mut invoice = visible(decision, id, tx.invoice_for_update(id).await?)?;
            invoice.ensure_mutable()?;
            let items = tx.items(id).await?;
            if !items.iter().any(|item| item.id == item_id) {
                return Err(EngineError::not_found(format!("invoice item {item_id}")));
            }
            tx.delete_item(item_id).await?;
            let remaining = subtotal(items.iter().filter(|item| item.id != item_id))?;
            invoice.set_subtotal(remaining, now)?;
            tx.update_invoice(&mut invoice).await?;
            Ok::<_, EngineError>(invoice)
        }
        .await;
        let invoice = finish(tx, staged).await?;
        self.announce(ChangeEvent::on_invoice(
            EntityKind::InvoiceItem,
            ChangeKind::Deleted,
            &invoice,
            now,
        ));
        Ok(invoice)
    }

    /// Administrative cancellation of an unsettled invoice.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id, invoice_id = %id), err)]
    pub async fn cancel_invoice(&self, caller: &Caller, id: InvoiceId) -> EngineResult<Invoice> {
        let decision = authorize(caller, Operation::CancelInvoice)?;
        let invoice = self
            .retrying("cancel_invoice", || self.try_cancel(decision, id))
            .await?;
        info!(invoice_id = %id, paid = %invoice.paid_amount(), "invoice cancelled");
        Ok(invoice)
    }

    async fn try_cancel(&self, decision: AccessDecision, id: InvoiceId) -> EngineResult<Invoice> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let staged = async {
            let mut invoice = visible(decision, id, tx.invoice_for_update(id).await?)?;
            invoice.cancel(now)?;
            tx.update_invoice(&mut invoice).await?;
            Ok::<_, EngineError>(invoice)
        }
        .await;
        let invoice = finish(tx, staged).await?;
        self.announce(ChangeEvent::on_invoice(
            EntityKind::Invoice,
            ChangeKind::Updated,
            &invoice,
            now,
        ));
        Ok(invoice)
    }

    // ── reads ────────────────────────────────────────────────────────────────

    pub async fn get_invoice(&self, caller: &Caller, id: InvoiceId) -> EngineResult<InvoiceDetail> {
        let decision = authorize(caller, Operation::ReadInvoice)?;
        match self.store.invoice_detail(id).await? {
            Some(detail) if decision.permits(detail.invoice.branch_id()) => Ok(detail),
            _ => Err(EngineError::not_found(format!("invoice {id}"))),
        }
    }

    /// Invoices visible to `caller`, newest first.
    ///
    /// Counter and waiter staff see today's invoices unless they ask for dates.
    pub async fn list_invoices(
        &self,
        caller: &Caller,
        query: &InvoiceQuery,
    ) -> EngineResult<Vec<Invoice>> {
        let decision = authorize(caller, Operation::ReadInvoice)?;
        let mut query = query.clone();
        if matches!(caller.effective_role(), Role::Counter | Role::Waiter) && !query.has_dates() {
            let today = Utc::now().date_naive();
            query.date_from = Some(today);
            query.date_to = Some(today);
        }
        if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
            if from > to {
                return Err(EngineError::validation(
                    "date_from",
                    "date_from must not be after date_to",
                ));
            }
        }
        let filter = query.to_filter(decision.branch_filter());
        Ok(self.store.list_invoices(&filter).await?)
    }
}

/// Branch a new invoice lands in.
fn resolve_branch(decision: AccessDecision, requested: Option<BranchId>) -> EngineResult<BranchId> {
    match (decision, requested) {
        (AccessDecision::AllowOwnBranch(own), None) => Ok(own),
        (AccessDecision::AllowOwnBranch(own), Some(branch)) if branch == own => Ok(own),
        (AccessDecision::AllowOwnBranch(_), Some(_)) => Err(AuthzError::BranchMismatch {
            operation: Operation::CreateInvoice,
        }
        .into()),
        (_, Some(branch)) => Ok(branch),
        (_, None) => Err(EngineError::validation(
            "branch_id",
            "branch_id is required for staff without a branch",
        )),
    }
}

async fn stage_create(
    tx: &mut dyn LedgerTx,
    caller: &Caller,
    branch: BranchId,
    cmd: &CreateInvoice,
    now: DateTime<Utc>,
) -> EngineResult<InvoiceDetail> {
    if tx.branch(branch).await?.is_none() {
        return Err(EngineError::validation(
            "branch_id",
            format!("branch {branch} does not exist"),
        ));
    }

    let id = InvoiceId::new(tx.allocate_id(IdKind::Invoice).await?);
    let requested_number = cmd
        .invoice_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let invoice_number = match requested_number {
        Some(number) => {
            if tx.invoice_number_exists(number).await? {
                return Err(EngineError::validation(
                    "invoice_number",
                    format!("invoice number '{number}' already exists"),
                ));
            }
            number.to_string()
        }
        None => default_invoice_number(id, now),
    };

    let items = price_items(tx, branch, id, &cmd.items, now).await?;
    let draft = InvoiceDraft {
        branch_id: branch,
        invoice_number,
        tax_amount: cmd.tax_amount,
        discount: cmd.discount,
        notes: cmd.notes.clone(),
        description: cmd.description.clone(),
        created_by: Some(caller.user_id),
        served_by: cmd.served_by,
    };
    let invoice = Invoice::open(id, draft, subtotal(&items)?, now)?;

    tx.insert_invoice(&invoice).await?;
    for item in &items {
        tx.insert_item(item).await?;
    }
    Ok(InvoiceDetail {
        invoice,
        items,
        payments: Vec::new(),
    })
}

/// Resolve products and price each requested line at the current list price.
async fn price_items(
    tx: &mut dyn LedgerTx,
    branch: BranchId,
    invoice_id: InvoiceId,
    requests: &[ItemRequest],
    now: DateTime<Utc>,
) -> EngineResult<Vec<InvoiceItem>> {
    let mut items = Vec::with_capacity(requests.len());
    for request in requests {
        if request.quantity == 0 {
            return Err(EngineError::validation(
                "quantity",
                "quantity must be at least 1",
            ));
        }
        let product = tx.product(request.product_id).await?.ok_or_else(|| {
            EngineError::validation(
                "product_id",
                format!("product {} does not exist", request.product_id),
            )
        })?;
        product.ensure_sellable_in(branch)?;
        let item_id = InvoiceItemId::new(tx.allocate_id(IdKind::InvoiceItem).await?);
        items.push(InvoiceItem::new(
            item_id,
            invoice_id,
            product.id,
            request.quantity,
            product.price,
            now,
        )?);
    }
    Ok(items)
}
