//! Transactional ledger store boundary.
//!
//! The engine only talks to [`LedgerStore`]/[`LedgerTx`]; backends decide how
//! isolation is achieved (commit-time version checks in memory, row locks in
//! Postgres).

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedgerStore;
pub use query::{InvoiceFilter, InvoiceTotals, SalesLine};
pub use r#trait::{IdKind, LedgerStore, LedgerTx, StoreError};
