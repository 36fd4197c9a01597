use serde::{Deserialize, Serialize};

use posledger_auth::Role;
use posledger_core::{BranchId, DomainError, DomainResult, Entity, UserId};

/// A staff account as known to the ledger (for attribution and counts).
///
/// Credentials live with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub branch_id: Option<BranchId>,
    pub is_superuser: bool,
}

impl Entity for StaffMember {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStaffMember {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl NewStaffMember {
    pub fn validated(self) -> DomainResult<Self> {
        let username = self.username.trim().to_string();
        if username.is_empty() {
            return Err(DomainError::validation("username", "username cannot be empty"));
        }
        if !self.role.is_global() && !self.is_superuser && self.branch_id.is_none() {
            return Err(DomainError::validation(
                "branch",
                format!("role {} requires a branch", self.role),
            ));
        }
        Ok(Self { username, ..self })
    }

    pub fn into_member(self) -> StaffMember {
        StaffMember {
            id: self.id,
            username: self.username,
            role: self.role,
            branch_id: self.branch_id,
            is_superuser: self.is_superuser,
        }
    }
}
