use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use posledger_catalog::{
    Branch, NewBranch, NewProduct, NewProductCategory, NewStaffMember, Product, ProductCategory,
    StaffMember,
};
use posledger_core::{
    AggregateRoot, BranchId, CategoryId, Entity, ExpectedVersion, InvoiceId, InvoiceItemId,
    PaymentId, ProductId, UserId,
};
use posledger_invoicing::{Invoice, InvoiceDetail, InvoiceItem, Payment};

use super::query::{InvoiceFilter, InvoiceTotals, SalesLine};
use super::r#trait::{IdKind, LedgerStore, LedgerTx, StoreError};

#[derive(Debug, Clone, Default)]
struct Tables {
    branches: BTreeMap<BranchId, Branch>,
    categories: BTreeMap<CategoryId, ProductCategory>,
    products: BTreeMap<ProductId, Product>,
    staff: BTreeMap<UserId, StaffMember>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    items: BTreeMap<InvoiceItemId, InvoiceItem>,
    payments: BTreeMap<PaymentId, Payment>,
}

fn put<E: Entity>(table: &mut BTreeMap<E::Id, E>, row: E) {
    table.insert(row.id(), row);
}

impl Tables {
    fn items_of(&self, invoice: InvoiceId) -> Vec<InvoiceItem> {
        self.items
            .values()
            .filter(|i| i.invoice_id == invoice)
            .cloned()
            .collect()
    }

    fn payments_of(&self, invoice: InvoiceId) -> Vec<Payment> {
        self.payments
            .values()
            .filter(|p| p.invoice_id == invoice)
            .cloned()
            .collect()
    }

    fn remove_invoice(&mut self, invoice: InvoiceId) {
        self.invoices.remove(&invoice);
        self.items.retain(|_, i| i.invoice_id != invoice);
        self.payments.retain(|_, p| p.invoice_id != invoice);
    }

    fn number_taken(&self, number: &str) -> bool {
        self.invoices.values().any(|i| i.invoice_number() == number)
    }
}

#[derive(Debug, Default)]
struct Sequences {
    branch: AtomicI64,
    category: AtomicI64,
    product: AtomicI64,
    invoice: AtomicI64,
    item: AtomicI64,
    payment: AtomicI64,
}

fn next(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    seq: Sequences,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

/// In-memory ledger store.
///
/// Transactions read from a private snapshot and validate the versions of
/// every invoice they read when committing (optimistic concurrency); a
/// mismatch fails the commit with [`StoreError::Conflict`].
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut tables = self.shared.tables.write().map_err(|_| poisoned())?;
        f(&mut tables)
    }
}

#[derive(Debug)]
enum Write {
    InsertInvoice(Invoice),
    UpdateInvoice(Invoice),
    DeleteInvoice(InvoiceId),
    InsertItem(InvoiceItem),
    DeleteItem(InvoiceItemId),
    InsertPayment(Payment),
}

struct InMemoryTx {
    shared: Arc<Shared>,
    view: Tables,
    /// Version of each invoice as first read by this transaction
    /// (`None` when it did not exist).
    read_versions: BTreeMap<InvoiceId, Option<u64>>,
    inserted: BTreeSet<InvoiceId>,
    writes: Vec<Write>,
}

impl InMemoryTx {
    fn note_read(&mut self, id: InvoiceId) {
        if self.inserted.contains(&id) {
            return;
        }
        let version = self.view.invoices.get(&id).map(|i| i.version());
        self.read_versions.entry(id).or_insert(version);
    }
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn allocate_id(&mut self, kind: IdKind) -> Result<i64, StoreError> {
        let seq = &self.shared.seq;
        Ok(match kind {
            IdKind::Invoice => next(&seq.invoice),
            IdKind::InvoiceItem => next(&seq.item),
            IdKind::Payment => next(&seq.payment),
        })
    }

    async fn branch(&mut self, id: BranchId) -> Result<Option<Branch>, StoreError> {
        Ok(self.view.branches.get(&id).cloned())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.view.products.get(&id).cloned())
    }

    async fn invoice_for_update(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.note_read(id);
        Ok(self.view.invoices.get(&id).cloned())
    }

    async fn invoice_number_exists(&mut self, number: &str) -> Result<bool, StoreError> {
        Ok(self.view.number_taken(number))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let id = invoice.id_typed();
        if self.view.invoices.contains_key(&id) {
            return Err(StoreError::UniqueViolation {
                field: "id",
                message: format!("invoice {id} already exists"),
            });
        }
        if self.view.number_taken(invoice.invoice_number()) {
            return Err(StoreError::UniqueViolation {
                field: "invoice_number",
                message: format!("invoice number '{}' is taken", invoice.invoice_number()),
            });
        }
        self.inserted.insert(id);
        self.view.invoices.insert(id, invoice.clone());
        self.writes.push(Write::InsertInvoice(invoice.clone()));
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &mut Invoice) -> Result<(), StoreError> {
        let id = invoice.id_typed();
        self.note_read(id);
        let current = self
            .view
            .invoices
            .get(&id)
            .map(|i| i.version())
            .ok_or_else(|| StoreError::Conflict(format!("invoice {id} no longer exists")))?;
        if !ExpectedVersion(invoice.version()).matches(current) {
            return Err(StoreError::Conflict(format!(
                "invoice {id} changed (expected version {}, found {current})",
                invoice.version()
            )));
        }
        invoice.set_version(current + 1);
        self.view.invoices.insert(id, invoice.clone());
        self.writes.push(Write::UpdateInvoice(invoice.clone()));
        Ok(())
    }

    async fn delete_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let id = invoice.id_typed();
        self.note_read(id);
        self.view.remove_invoice(id);
        self.writes.push(Write::DeleteInvoice(id));
        Ok(())
    }

    async fn items(&mut self, invoice: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError> {
        Ok(self.view.items_of(invoice))
    }

    async fn insert_item(&mut self, item: &InvoiceItem) -> Result<(), StoreError> {
        if !self.view.invoices.contains_key(&item.invoice_id) {
            return Err(StoreError::InvalidReference {
                field: "invoice",
                message: format!("invoice {} does not exist", item.invoice_id),
            });
        }
        put(&mut self.view.items, item.clone());
        self.writes.push(Write::InsertItem(item.clone()));
        Ok(())
    }

    async fn delete_item(&mut self, item: InvoiceItemId) -> Result<(), StoreError> {
        self.view.items.remove(&item);
        self.writes.push(Write::DeleteItem(item));
        Ok(())
    }

    async fn payments(&mut self, invoice: InvoiceId) -> Result<Vec<Payment>, StoreError> {
        Ok(self.view.payments_of(invoice))
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        if !self.view.invoices.contains_key(&payment.invoice_id) {
            return Err(StoreError::InvalidReference {
                field: "invoice",
                message: format!("invoice {} does not exist", payment.invoice_id),
            });
        }
        put(&mut self.view.payments, payment.clone());
        self.writes.push(Write::InsertPayment(payment.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut live = this.shared.tables.write().map_err(|_| poisoned())?;

        for (id, seen) in &this.read_versions {
            let now = live.invoices.get(id).map(|i| i.version());
            if now != *seen {
                return Err(StoreError::Conflict(format!(
                    "invoice {id} was modified concurrently (read {seen:?}, now {now:?})"
                )));
            }
        }
        for write in &this.writes {
            if let Write::InsertInvoice(invoice) = write {
                if live.number_taken(invoice.invoice_number()) {
                    return Err(StoreError::UniqueViolation {
                        field: "invoice_number",
                        message: format!("invoice number '{}' is taken", invoice.invoice_number()),
                    });
                }
            }
        }

        for write in this.writes {
            match write {
                Write::InsertInvoice(invoice) | Write::UpdateInvoice(invoice) => {
                    live.invoices.insert(invoice.id_typed(), invoice);
                }
                Write::DeleteInvoice(id) => live.remove_invoice(id),
                Write::InsertItem(item) => put(&mut live.items, item),
                Write::DeleteItem(id) => {
                    live.items.remove(&id);
                }
                Write::InsertPayment(payment) => put(&mut live.payments, payment),
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let view = self.read(Tables::clone)?;
        Ok(Box::new(InMemoryTx {
            shared: Arc::clone(&self.shared),
            view,
            read_versions: BTreeMap::new(),
            inserted: BTreeSet::new(),
            writes: Vec::new(),
        }))
    }

    async fn invoice_detail(&self, id: InvoiceId) -> Result<Option<InvoiceDetail>, StoreError> {
        self.read(|t| {
            t.invoices.get(&id).map(|invoice| InvoiceDetail {
                invoice: invoice.clone(),
                items: t.items_of(id),
                payments: t.payments_of(id),
            })
        })
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError> {
        self.read(|t| {
            let mut rows: Vec<Invoice> = t
                .invoices
                .values()
                .filter(|i| filter.matches(i))
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                b.created_at()
                    .cmp(&a.created_at())
                    .then(b.id_typed().cmp(&a.id_typed()))
            });
            if let Some(limit) = filter.limit {
                rows.truncate(limit as usize);
            }
            rows
        })
    }

    async fn invoice_totals(&self, filter: &InvoiceFilter) -> Result<InvoiceTotals, StoreError> {
        self.read(|t| {
            let mut totals = InvoiceTotals::default();
            for invoice in t.invoices.values().filter(|i| filter.matches(i)) {
                totals.add(invoice);
            }
            totals
        })
    }

    async fn sales_lines(&self, filter: &InvoiceFilter) -> Result<Vec<SalesLine>, StoreError> {
        self.read(|t| {
            t.items
                .values()
                .filter_map(|item| {
                    let invoice = t.invoices.get(&item.invoice_id)?;
                    if !filter.matches(invoice) {
                        return None;
                    }
                    let product = t.products.get(&item.product_id);
                    let category = product.and_then(|p| t.categories.get(&p.category_id));
                    Some(SalesLine {
                        invoice_id: item.invoice_id,
                        branch_id: invoice.branch_id(),
                        product_id: item.product_id,
                        product_name: product
                            .map(|p| p.name.clone())
                            .unwrap_or_else(|| format!("product {}", item.product_id)),
                        category_name: category
                            .map(|c| c.name.clone())
                            .unwrap_or_else(|| "Uncategorized".to_string()),
                        quantity: item.quantity,
                        line_total: item.line_total,
                        ordered_at: invoice.created_at(),
                    })
                })
                .collect()
        })
    }

    async fn count_branches(&self) -> Result<u64, StoreError> {
        self.read(|t| t.branches.len() as u64)
    }

    async fn count_staff(&self) -> Result<u64, StoreError> {
        self.read(|t| t.staff.len() as u64)
    }

    async fn create_branch(&self, new: NewBranch) -> Result<Branch, StoreError> {
        let key = new.name_key();
        self.write(|t| {
            if t.branches.values().any(|b| b.name_key() == key) {
                return Err(StoreError::UniqueViolation {
                    field: "name",
                    message: format!("a branch named '{}' already exists", new.name),
                });
            }
            let branch = Branch {
                id: BranchId::new(next(&self.shared.seq.branch)),
                name: new.name,
                location: new.location,
                created_at: Utc::now(),
            };
            put(&mut t.branches, branch.clone());
            Ok(branch)
        })
    }

    async fn create_category(
        &self,
        new: NewProductCategory,
    ) -> Result<ProductCategory, StoreError> {
        self.write(|t| {
            if !t.branches.contains_key(&new.branch_id) {
                return Err(StoreError::InvalidReference {
                    field: "branch",
                    message: format!("branch {} does not exist", new.branch_id),
                });
            }
            let category = ProductCategory {
                id: CategoryId::new(next(&self.shared.seq.category)),
                branch_id: new.branch_id,
                name: new.name,
            };
            put(&mut t.categories, category.clone());
            Ok(category)
        })
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        self.write(|t| {
            let category = t.categories.get(&new.category_id).ok_or_else(|| {
                StoreError::InvalidReference {
                    field: "category",
                    message: format!("category {} does not exist", new.category_id),
                }
            })?;
            let product = Product {
                id: ProductId::new(next(&self.shared.seq.product)),
                branch_id: category.branch_id,
                category_id: category.id,
                name: new.name,
                price: new.price,
                is_available: new.is_available,
            };
            put(&mut t.products, product.clone());
            Ok(product)
        })
    }

    async fn register_staff(&self, new: NewStaffMember) -> Result<StaffMember, StoreError> {
        self.write(|t| {
            if t.staff.contains_key(&new.id) {
                return Err(StoreError::UniqueViolation {
                    field: "id",
                    message: format!("staff member {} already exists", new.id),
                });
            }
            if let Some(branch) = new.branch_id {
                if !t.branches.contains_key(&branch) {
                    return Err(StoreError::InvalidReference {
                        field: "branch",
                        message: format!("branch {branch} does not exist"),
                    });
                }
            }
            let member = new.into_member();
            put(&mut t.staff, member.clone());
            Ok(member)
        })
    }
}
