use serde::{Deserialize, Serialize};

use posledger_core::{BranchId, CategoryId, DomainError, DomainResult, Entity, Money, ProductId};

/// Menu category, owned by a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: CategoryId,
    pub branch_id: BranchId,
    pub name: String,
}

impl Entity for ProductCategory {
    type Id = CategoryId;

    fn id(&self) -> CategoryId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductCategory {
    pub branch_id: BranchId,
    pub name: String,
}

impl NewProductCategory {
    pub fn validated(self) -> DomainResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name", "category name cannot be empty"));
        }
        Ok(Self { name, ..self })
    }
}

/// A sellable menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub branch_id: BranchId,
    pub category_id: CategoryId,
    pub name: String,
    pub price: Money,
    pub is_available: bool,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }
}

impl Product {
    /// Can this product be put on an invoice of `branch`?
    pub fn ensure_sellable_in(&self, branch: BranchId) -> DomainResult<()> {
        if self.branch_id != branch {
            return Err(DomainError::validation(
                "product",
                format!("product {} is not sold in branch {branch}", self.id),
            ));
        }
        if !self.is_available {
            return Err(DomainError::validation(
                "product",
                format!("product '{}' is currently unavailable", self.name),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub category_id: CategoryId,
    pub name: String,
    pub price: Money,
    #[serde(default = "available")]
    pub is_available: bool,
}

fn available() -> bool {
    true
}

impl NewProduct {
    pub fn validated(self) -> DomainResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name", "product name cannot be empty"));
        }
        if self.price.minor() < 0 {
            return Err(DomainError::validation("price", "price cannot be negative"));
        }
        Ok(Self { name, ..self })
    }
}
