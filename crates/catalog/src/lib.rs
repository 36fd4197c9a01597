//! `posledger-catalog`: branches, menu products and staff.
//!
//! These are plain reference records: invoices point at them, the dashboard
//! groups by them. Their CRUD lives outside the ledger engine; this crate only
//! owns their shape and input validation.

pub mod branch;
pub mod product;
pub mod staff;

pub use branch::{name_key, Branch, NewBranch};
pub use product::{NewProduct, NewProductCategory, Product, ProductCategory};
pub use staff::{NewStaffMember, StaffMember};
