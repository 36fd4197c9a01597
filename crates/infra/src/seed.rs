//! Catalog seeding from a JSON document.
//!
//! Branches, categories, products and staff are administered outside the
//! ledger; a seed file is how a fresh deployment (or a test) gets them.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use posledger_auth::Role;
use posledger_catalog::{name_key, NewBranch, NewProduct, NewProductCategory, NewStaffMember};
use posledger_core::{BranchId, DomainError, Money, UserId};

use crate::ledger_store::{LedgerStore, StoreError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid seed document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("staff member `{username}` refers to unknown branch `{branch}`")]
    UnknownBranch { username: String, branch: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub branches: Vec<SeedBranch>,
    #[serde(default)]
    pub staff: Vec<SeedStaff>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedBranch {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub categories: Vec<SeedCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub price: Money,
    #[serde(default = "available")]
    pub is_available: bool,
}

fn available() -> bool {
    true
}

/// Staff entry; `branch` names a branch of the same document.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedStaff {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub branches: usize,
    pub categories: usize,
    pub products: usize,
    pub staff: usize,
}

impl CatalogSeed {
    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Create everything in `seed`, branches first.
pub async fn apply_seed<S>(store: &S, seed: &CatalogSeed) -> Result<SeedReport, SeedError>
where
    S: LedgerStore + ?Sized,
{
    let mut report = SeedReport::default();
    let mut branch_ids: HashMap<String, BranchId> = HashMap::new();

    for entry in &seed.branches {
        let draft = NewBranch {
            name: entry.name.clone(),
            location: entry.location.clone(),
        }
        .validated()?;
        let branch = store.create_branch(draft).await?;
        branch_ids.insert(branch.name_key(), branch.id);
        report.branches += 1;

        for category in &entry.categories {
            let category_row = store
                .create_category(
                    NewProductCategory {
                        branch_id: branch.id,
                        name: category.name.clone(),
                    }
                    .validated()?,
                )
                .await?;
            report.categories += 1;

            for product in &category.products {
                let draft = NewProduct {
                    category_id: category_row.id,
                    name: product.name.clone(),
                    price: product.price,
                    is_available: product.is_available,
                }
                .validated()?;
                store.create_product(draft).await?;
                report.products += 1;
            }
        }
    }

    for member in &seed.staff {
        let branch_id = match &member.branch {
            Some(name) => Some(*branch_ids.get(&name_key(name)).ok_or_else(|| {
                SeedError::UnknownBranch {
                    username: member.username.clone(),
                    branch: name.clone(),
                }
            })?),
            None => None,
        };
        let draft = NewStaffMember {
            id: member.id,
            username: member.username.clone(),
            role: member.role,
            branch_id,
            is_superuser: member.is_superuser,
        }
        .validated()?;
        store.register_staff(draft).await?;
        report.staff += 1;
    }

    info!(
        branches = report.branches,
        categories = report.categories,
        products = report.products,
        staff = report.staff,
        "catalog seeded"
    );
    Ok(report)
}
