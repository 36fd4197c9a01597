//! `posledger-auth`: access policy for branch-scoped POS staff.
//!
//! This crate is decoupled from HTTP and storage: it answers "may this caller
//! do this operation, and over which branches?".

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{
    authorize, authorize_branch, evaluate, explain_access, AccessDecision, AccessExplanation,
    AuthzError,
};
pub use claims::{
    sign_hs256, validate_claims, Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError,
};
pub use permissions::Operation;
pub use principal::Caller;
pub use roles::Role;
