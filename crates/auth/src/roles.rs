use serde::{Deserialize, Serialize};

/// Staff role as issued by the identity provider.
///
/// `SuperAdmin` is never stored on a staff record; it is what a superuser
/// flag resolves to (see [`crate::Caller::effective_role`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    BranchManager,
    Counter,
    Waiter,
    Kitchen,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Admin => "ADMIN",
            Role::BranchManager => "BRANCH_MANAGER",
            Role::Counter => "COUNTER",
            Role::Waiter => "WAITER",
            Role::Kitchen => "KITCHEN",
        }
    }

    /// Roles whose reach is not bounded by a branch.
    pub fn is_global(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            "ADMIN" => Ok(Role::Admin),
            "BRANCH_MANAGER" => Ok(Role::BranchManager),
            "COUNTER" => Ok(Role::Counter),
            "WAITER" => Ok(Role::Waiter),
            "KITCHEN" => Ok(Role::Kitchen),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}
