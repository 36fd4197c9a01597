use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{BranchId, DomainError, DomainResult, Entity};

/// A physical outlet. Every invoice belongs to exactly one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Branch {
    type Id = BranchId;

    fn id(&self) -> BranchId {
        self.id
    }
}

impl Branch {
    /// Key used for the case-insensitive uniqueness rule on names.
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBranch {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewBranch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    /// Trim and check the input, returning the normalized draft.
    pub fn validated(self) -> DomainResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name", "branch name cannot be empty"));
        }
        if name.chars().count() > 100 {
            return Err(DomainError::validation("name", "branch name is too long"));
        }
        Ok(Self {
            name,
            location: self
                .location
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
        })
    }

    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// Normalized form used to compare branch names ("Downtown" == " downtown ").
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
