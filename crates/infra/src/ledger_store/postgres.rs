//! Postgres-backed ledger store.
//!
//! Invoices are locked with `SELECT ... FOR UPDATE` inside the transaction,
//! and updates are additionally guarded by the `version` column so a stale
//! write can never land silently.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | StoreError |
//! |----------|------------|
//! | `23505` unique violation | `UniqueViolation` |
//! | `23503` foreign key violation | `InvalidReference` |
//! | `40001` / `40P01` serialization failure, deadlock | `Conflict` |
//! | anything else, pool closed, IO | `Unavailable` |

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;

use posledger_catalog::{
    Branch, NewBranch, NewProduct, NewProductCategory, NewStaffMember, Product, ProductCategory,
    StaffMember,
};
use posledger_core::{
    AggregateRoot, BranchId, CategoryId, InvoiceId, InvoiceItemId, Money, PaymentId, ProductId,
    UserId,
};
use posledger_invoicing::{
    Invoice, InvoiceDetail, InvoiceItem, InvoiceRecord, OrderStatus, Payment, PaymentMethod,
    PaymentStatus,
};

use super::query::{InvoiceFilter, InvoiceTotals, SalesLine};
use super::r#trait::{IdKind, LedgerStore, LedgerTx, StoreError};

const SCHEMA: &str = include_str!("schema.sql");

const INVOICE_COLUMNS: &str = "id, branch_id, invoice_number, subtotal_minor, tax_minor, \
     discount_minor, total_minor, paid_minor, payment_status, order_status, notes, description, \
     is_active, created_by, served_by, created_at, updated_at, version";

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation {
                    field: unique_field(&constraint),
                    message: msg,
                },
                Some("23503") => StoreError::InvalidReference {
                    field: reference_field(&constraint),
                    message: msg,
                },
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("bad row in {operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

fn unique_field(constraint: &str) -> &'static str {
    if constraint.contains("invoice_number") {
        "invoice_number"
    } else if constraint.contains("name") {
        "name"
    } else {
        "id"
    }
}

fn reference_field(constraint: &str) -> &'static str {
    if constraint.contains("category") {
        "category"
    } else if constraint.contains("product") {
        "product"
    } else if constraint.contains("invoice") {
        "invoice"
    } else {
        "branch"
    }
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {detail}"))
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| map_sqlx_error(name, e))
}

fn money(row: &PgRow, name: &str) -> Result<Money, StoreError> {
    col::<i64>(row, name).map(Money::from_minor)
}

fn version_of(row: &PgRow) -> Result<u64, StoreError> {
    let v: i64 = col(row, "version")?;
    u64::try_from(v).map_err(|e| corrupt("version", e))
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, StoreError> {
    let payment_status: String = col(row, "payment_status")?;
    let order_status: String = col(row, "order_status")?;
    let record = InvoiceRecord {
        id: InvoiceId::new(col(row, "id")?),
        branch_id: BranchId::new(col(row, "branch_id")?),
        invoice_number: col(row, "invoice_number")?,
        subtotal: money(row, "subtotal_minor")?,
        tax_amount: money(row, "tax_minor")?,
        discount: money(row, "discount_minor")?,
        total_amount: money(row, "total_minor")?,
        paid_amount: money(row, "paid_minor")?,
        payment_status: PaymentStatus::from_str(&payment_status)
            .map_err(|e| corrupt("payment_status", e))?,
        order_status: OrderStatus::from_str(&order_status)
            .map_err(|e| corrupt("order_status", e))?,
        notes: col(row, "notes")?,
        description: col(row, "description")?,
        is_active: col(row, "is_active")?,
        created_by: col::<Option<i64>>(row, "created_by")?.map(UserId::new),
        served_by: col::<Option<i64>>(row, "served_by")?.map(UserId::new),
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        version: version_of(row)?,
    };
    Invoice::restore(record).map_err(|e| corrupt("invoice", e))
}

fn item_from_row(row: &PgRow) -> Result<InvoiceItem, StoreError> {
    let quantity: i32 = col(row, "quantity")?;
    Ok(InvoiceItem {
        id: InvoiceItemId::new(col(row, "id")?),
        invoice_id: InvoiceId::new(col(row, "invoice_id")?),
        product_id: ProductId::new(col(row, "product_id")?),
        quantity: u32::try_from(quantity).map_err(|e| corrupt("quantity", e))?,
        unit_price: money(row, "unit_price_minor")?,
        line_total: money(row, "line_total_minor")?,
        created_at: col(row, "created_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let method: String = col(row, "payment_method")?;
    Ok(Payment {
        id: PaymentId::new(col(row, "id")?),
        invoice_id: InvoiceId::new(col(row, "invoice_id")?),
        amount: money(row, "amount_minor")?,
        payment_method: PaymentMethod::from_str(&method)
            .map_err(|e| corrupt("payment_method", e))?,
        transaction_id: col(row, "transaction_id")?,
        notes: col(row, "notes")?,
        received_by: col::<Option<i64>>(row, "received_by")?.map(UserId::new),
        paid_at: col(row, "paid_at")?,
    })
}

fn branch_from_row(row: &PgRow) -> Result<Branch, StoreError> {
    Ok(Branch {
        id: BranchId::new(col(row, "id")?),
        name: col(row, "name")?,
        location: col(row, "location")?,
        created_at: col(row, "created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: ProductId::new(col(row, "id")?),
        branch_id: BranchId::new(col(row, "branch_id")?),
        category_id: CategoryId::new(col(row, "category_id")?),
        name: col(row, "name")?,
        price: money(row, "price_minor")?,
        is_available: col(row, "is_available")?,
    })
}

/// Append the `WHERE` clause for `filter` to a query over `invoices` aliased `i`.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &InvoiceFilter) {
    qb.push(" WHERE TRUE");
    if let Some(branch) = filter.branch_id {
        qb.push(" AND i.branch_id = ").push_bind(branch.get());
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND i.created_at >= ").push_bind(from);
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND i.created_at < ").push_bind(before);
    }
    if let Some(status) = filter.payment_status {
        qb.push(" AND i.payment_status = ")
            .push_bind(status.as_str());
    }
    if filter.exclude_cancelled {
        qb.push(" AND i.payment_status <> ")
            .push_bind(PaymentStatus::Cancelled.as_str());
    }
}

pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresTx {
    async fn allocate_id(&mut self, kind: IdKind) -> Result<i64, StoreError> {
        let sequence = match kind {
            IdKind::Invoice => "invoices_id_seq",
            IdKind::InvoiceItem => "invoice_items_id_seq",
            IdKind::Payment => "payments_id_seq",
        };
        let row = sqlx::query("SELECT nextval($1::regclass) AS id")
            .bind(sequence)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("allocate_id", e))?;
        col(&row, "id")
    }

    async fn branch(&mut self, id: BranchId) -> Result<Option<Branch>, StoreError> {
        let row = sqlx::query("SELECT id, name, location, created_at FROM branches WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("branch", e))?;
        row.as_ref().map(branch_from_row).transpose()
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT id, branch_id, category_id, name, price_minor, is_available \
             FROM products WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    async fn invoice_for_update(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("invoice_for_update", e))?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn invoice_number_exists(&mut self, number: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM invoices WHERE invoice_number = $1) AS taken")
            .bind(number)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("invoice_number_exists", e))?;
        col(&row, "taken")
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id_typed()), err)]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, branch_id, invoice_number, subtotal_minor, tax_minor, discount_minor,
                total_minor, paid_minor, payment_status, order_status, notes, description,
                is_active, created_by, served_by, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, 0)
            "#,
        )
        .bind(invoice.id_typed().get())
        .bind(invoice.branch_id().get())
        .bind(invoice.invoice_number())
        .bind(invoice.subtotal().minor())
        .bind(invoice.tax_amount().minor())
        .bind(invoice.discount().minor())
        .bind(invoice.total_amount().minor())
        .bind(invoice.paid_amount().minor())
        .bind(invoice.payment_status().as_str())
        .bind(invoice.order_status().as_str())
        .bind(invoice.notes())
        .bind(invoice.description())
        .bind(invoice.is_active())
        .bind(invoice.created_by().map(UserId::get))
        .bind(invoice.served_by().map(UserId::get))
        .bind(invoice.created_at())
        .bind(invoice.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, invoice),
        fields(invoice_id = %invoice.id_typed(), version = invoice.version()),
        err
    )]
    async fn update_invoice(&mut self, invoice: &mut Invoice) -> Result<(), StoreError> {
        let expected = i64::try_from(invoice.version()).map_err(|e| corrupt("version", e))?;
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                subtotal_minor = $3, tax_minor = $4, discount_minor = $5, total_minor = $6,
                paid_minor = $7, payment_status = $8, order_status = $9, notes = $10,
                description = $11, is_active = $12, served_by = $13, updated_at = $14,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(invoice.id_typed().get())
        .bind(expected)
        .bind(invoice.subtotal().minor())
        .bind(invoice.tax_amount().minor())
        .bind(invoice.discount().minor())
        .bind(invoice.total_amount().minor())
        .bind(invoice.paid_amount().minor())
        .bind(invoice.payment_status().as_str())
        .bind(invoice.order_status().as_str())
        .bind(invoice.notes())
        .bind(invoice.description())
        .bind(invoice.is_active())
        .bind(invoice.served_by().map(UserId::get))
        .bind(invoice.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_invoice", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "invoice {} changed since version {}",
                invoice.id_typed(),
                invoice.version()
            )));
        }
        invoice.set_version(invoice.version() + 1);
        Ok(())
    }

    async fn delete_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice.id_typed().get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        Ok(())
    }

    async fn items(&mut self, invoice: InvoiceId) -> Result<Vec<InvoiceItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, invoice_id, product_id, quantity, unit_price_minor, line_total_minor, \
             created_at FROM invoice_items WHERE invoice_id = $1 ORDER BY id",
        )
        .bind(invoice.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn insert_item(&mut self, item: &InvoiceItem) -> Result<(), StoreError> {
        let quantity = i32::try_from(item.quantity).map_err(|e| corrupt("quantity", e))?;
        sqlx::query(
            "INSERT INTO invoice_items (id, invoice_id, product_id, quantity, unit_price_minor, \
             line_total_minor, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id.get())
        .bind(item.invoice_id.get())
        .bind(item.product_id.get())
        .bind(quantity)
        .bind(item.unit_price.minor())
        .bind(item.line_total.minor())
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    async fn delete_item(&mut self, item: InvoiceItemId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM invoice_items WHERE id = $1")
            .bind(item.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(())
    }

    async fn payments(&mut self, invoice: InvoiceId) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, invoice_id, amount_minor, payment_method, transaction_id, notes, \
             received_by, paid_at FROM payments WHERE invoice_id = $1 ORDER BY id",
        )
        .bind(invoice.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("payments", e))?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (id, invoice_id, amount_minor, payment_method, transaction_id, \
             notes, received_by, paid_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id.get())
        .bind(payment.invoice_id.get())
        .bind(payment.amount.minor())
        .bind(payment.payment_method.as_str())
        .bind(payment.transaction_id.as_deref())
        .bind(payment.notes.as_deref())
        .bind(payment.received_by.map(UserId::get))
        .bind(payment.paid_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    async fn invoice_detail(&self, id: InvoiceId) -> Result<Option<InvoiceDetail>, StoreError> {
        // One transaction so the invoice and its children come from one snapshot.
        let mut tx = PostgresTx {
            tx: self
                .pool
                .begin()
                .await
                .map_err(|e| map_sqlx_error("invoice_detail", e))?,
        };
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *tx.tx)
            .await
            .map_err(|e| map_sqlx_error("invoice_detail", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let invoice = invoice_from_row(&row)?;
        let items = tx.items(id).await?;
        let payments = tx.payments(id).await?;
        Box::new(tx).rollback().await?;
        Ok(Some(InvoiceDetail {
            invoice,
            items,
            payments,
        }))
    }

    #[instrument(skip(self), err)]
    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices i"
        ));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY i.created_at DESC, i.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_invoices", e))?;
        rows.iter().map(invoice_from_row).collect()
    }

    async fn invoice_totals(&self, filter: &InvoiceFilter) -> Result<InvoiceTotals, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS n, COALESCE(SUM(i.total_minor), 0)::BIGINT AS total, \
             COALESCE(SUM(i.paid_minor), 0)::BIGINT AS paid FROM invoices i",
        );
        push_filter(&mut qb, filter);
        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("invoice_totals", e))?;
        let count: i64 = col(&row, "n")?;
        Ok(InvoiceTotals {
            count: u64::try_from(count).map_err(|e| corrupt("count", e))?,
            total_amount: money(&row, "total")?,
            paid_amount: money(&row, "paid")?,
        })
    }

    async fn sales_lines(&self, filter: &InvoiceFilter) -> Result<Vec<SalesLine>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT ii.invoice_id, i.branch_id, ii.product_id, p.name AS product_name, \
             COALESCE(c.name, 'Uncategorized') AS category_name, ii.quantity, \
             ii.line_total_minor, i.created_at \
             FROM invoice_items ii \
             JOIN invoices i ON i.id = ii.invoice_id \
             JOIN products p ON p.id = ii.product_id \
             LEFT JOIN product_categories c ON c.id = p.category_id",
        );
        push_filter(&mut qb, filter);
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("sales_lines", e))?;
        rows.iter()
            .map(|row| {
                let quantity: i32 = col(row, "quantity")?;
                Ok(SalesLine {
                    invoice_id: InvoiceId::new(col(row, "invoice_id")?),
                    branch_id: BranchId::new(col(row, "branch_id")?),
                    product_id: ProductId::new(col(row, "product_id")?),
                    product_name: col(row, "product_name")?,
                    category_name: col(row, "category_name")?,
                    quantity: u32::try_from(quantity).map_err(|e| corrupt("quantity", e))?,
                    line_total: money(row, "line_total_minor")?,
                    ordered_at: col::<DateTime<Utc>>(row, "created_at")?,
                })
            })
            .collect()
    }

    async fn count_branches(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM branches")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_branches", e))?;
        let n: i64 = col(&row, "n")?;
        u64::try_from(n).map_err(|e| corrupt("count", e))
    }

    async fn count_staff(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM staff")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_staff", e))?;
        let n: i64 = col(&row, "n")?;
        u64::try_from(n).map_err(|e| corrupt("count", e))
    }

    #[instrument(skip(self), err)]
    async fn create_branch(&self, new: NewBranch) -> Result<Branch, StoreError> {
        let row = sqlx::query(
            "INSERT INTO branches (name, location) VALUES ($1, $2) \
             RETURNING id, name, location, created_at",
        )
        .bind(&new.name)
        .bind(new.location.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_branch", e))?;
        branch_from_row(&row)
    }

    async fn create_category(
        &self,
        new: NewProductCategory,
    ) -> Result<ProductCategory, StoreError> {
        let row = sqlx::query(
            "INSERT INTO product_categories (branch_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(new.branch_id.get())
        .bind(&new.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_category", e))?;
        Ok(ProductCategory {
            id: CategoryId::new(col(&row, "id")?),
            branch_id: new.branch_id,
            name: new.name,
        })
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (branch_id, category_id, name, price_minor, is_available)
            SELECT c.branch_id, c.id, $2, $3, $4 FROM product_categories c WHERE c.id = $1
            RETURNING id, branch_id, category_id, name, price_minor, is_available
            "#,
        )
        .bind(new.category_id.get())
        .bind(&new.name)
        .bind(new.price.minor())
        .bind(new.is_available)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_product", e))?;
        match row {
            Some(row) => product_from_row(&row),
            None => Err(StoreError::InvalidReference {
                field: "category",
                message: format!("category {} does not exist", new.category_id),
            }),
        }
    }

    async fn register_staff(&self, new: NewStaffMember) -> Result<StaffMember, StoreError> {
        sqlx::query(
            "INSERT INTO staff (id, username, role, branch_id, is_superuser) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(new.id.get())
        .bind(&new.username)
        .bind(new.role.as_str())
        .bind(new.branch_id.map(BranchId::get))
        .bind(new.is_superuser)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_staff", e))?;
        Ok(new.into_member())
    }
}

