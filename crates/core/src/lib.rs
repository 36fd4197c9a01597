//! `posledger-core`: foundation building blocks for the POS ledger.
//!
//! This crate contains **pure domain** primitives (no IO, no transport).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    BranchId, CategoryId, InvoiceId, InvoiceItemId, PaymentId, ProductId, SessionId, UserId,
};
pub use money::Money;
pub use value_object::ValueObject;
