//! HTTP surface of the ledger: write API, live push feeds and the dashboard
//! stream.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
