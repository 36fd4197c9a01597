use serde::{Deserialize, Serialize};

use posledger_core::{BranchId, UserId};

use crate::Role;

/// The authenticated caller of an operation.
///
/// Built from verified identity claims; credentials are never checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
    pub branch_id: Option<BranchId>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role, branch_id: Option<BranchId>) -> Self {
        Self {
            user_id,
            role,
            branch_id,
            is_superuser: false,
        }
    }

    pub fn superuser(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::SuperAdmin,
            branch_id: None,
            is_superuser: true,
        }
    }

    /// The role policy decisions are made on.
    pub fn effective_role(&self) -> Role {
        if self.is_superuser {
            Role::SuperAdmin
        } else {
            self.role
        }
    }
}
