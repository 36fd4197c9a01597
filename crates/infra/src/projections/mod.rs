//! Read-side projections over committed ledger rows.

pub mod dashboard;

pub use dashboard::{
    compute_snapshot, BranchSnapshot, CategorySales, DashboardSnapshot, GlobalSnapshot,
    TopSellingItem, WeeklySales,
};
