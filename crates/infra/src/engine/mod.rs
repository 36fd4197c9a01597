//! Invoice transaction engine.
//!
//! Every mutating operation follows the same pipeline:
//!
//! ```text
//! Request (caller + input)
//!   ↓
//! 1. Authorize against the access policy (no IO)
//!   ↓
//! 2. Begin a ledger transaction
//!   ↓
//! 3. Load + lock the invoice, apply the domain rules, stage the writes
//!   ↓
//! 4. Commit (or roll back: nothing becomes visible)
//!   ↓
//! 5. Notify observers once, after the commit
//! ```
//!
//! Business rule violations surface before the commit and are never retried.
//! Store conflicts re-run the whole pipeline (fresh reads, fresh checks) up to
//! [`EngineConfig::max_conflict_retries`] times.

mod commands;
mod error;
mod invoices;
mod payments;

use std::future::Future;

use tracing::{debug, warn};

use posledger_auth::AccessDecision;
use posledger_core::InvoiceId;
use posledger_events::{ChangeEvent, Notifier};
use posledger_invoicing::Invoice;

use crate::ledger_store::{LedgerStore, LedgerTx};

pub use commands::{CreateInvoice, InvoiceQuery, PaymentReceipt};
pub use error::EngineError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How many times an operation is re-run after a store conflict.
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
        }
    }
}

/// Applies ledger operations atomically and announces committed changes.
///
/// - `S`: ledger store (in-memory for tests/dev, Postgres in production)
/// - `N`: notifier receiving one [`posledger_events::ChangeEvent`] per commit
#[derive(Debug, Clone)]
pub struct InvoiceEngine<S, N> {
    store: S,
    notifier: N,
    config: EngineConfig,
}

impl<S, N> InvoiceEngine<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self::with_config(store, notifier, EngineConfig::default())
    }

    pub fn with_config(store: S, notifier: N, config: EngineConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

impl<S, N> InvoiceEngine<S, N>
where
    S: LedgerStore,
    N: Notifier,
{
    /// Run `attempt` until it succeeds, fails for a non-retryable reason, or
    /// the conflict budget is spent.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(EngineError::Conflict(reason)) => {
                    if retries >= self.config.max_conflict_retries {
                        warn!(operation, retries, %reason, "giving up after repeated conflicts");
                        return Err(EngineError::TransientStore(format!(
                            "{operation} kept conflicting with concurrent writers: {reason}"
                        )));
                    }
                    retries += 1;
                    debug!(operation, retry = retries, %reason, "store conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Hand a committed change to the notifier.
    fn announce(&self, change: ChangeEvent) {
        debug!(
            invoice_id = %change.invoice_id,
            branch_id = %change.branch_id,
            entity = ?change.entity,
            change = ?change.change,
            "announcing committed change"
        );
        self.notifier.notify(&change);
    }
}

/// Commit when staging succeeded, roll back otherwise.
async fn finish<T>(tx: Box<dyn LedgerTx>, staged: EngineResult<T>) -> EngineResult<T> {
    match staged {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Out-of-scope rows are indistinguishable from missing ones.
fn visible(decision: AccessDecision, id: InvoiceId, found: Option<Invoice>) -> EngineResult<Invoice> {
    match found {
        Some(invoice) if decision.permits(invoice.branch_id()) => Ok(invoice),
        _ => Err(EngineError::not_found(format!("invoice {id}"))),
    }
}
