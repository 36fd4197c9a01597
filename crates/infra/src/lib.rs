//! Infrastructure layer: ledger stores, the transaction engine, dashboard
//! projections and catalog seeding.

pub mod engine;
pub mod ledger_store;
pub mod projections;
pub mod seed;

mod integration_tests;

pub use engine::{
    CreateInvoice, EngineConfig, EngineError, EngineResult, InvoiceEngine, InvoiceQuery,
    PaymentReceipt,
};
