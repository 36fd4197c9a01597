use serde::Serialize;
use thiserror::Error;

use posledger_core::BranchId;

use crate::{Caller, Operation, Role};

/// Outcome of a policy evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "branch_id", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Every branch is visible/writable.
    AllowAll,
    /// Only records of this branch are visible/writable.
    AllowOwnBranch(BranchId),
    Deny,
}

impl AccessDecision {
    /// Does this decision cover a record of `branch`?
    pub fn permits(&self, branch: BranchId) -> bool {
        match self {
            AccessDecision::AllowAll => true,
            AccessDecision::AllowOwnBranch(own) => *own == branch,
            AccessDecision::Deny => false,
        }
    }

    /// Branch filter to apply to list queries (`None` means all branches).
    ///
    /// Only meaningful for allowing decisions; check [`Self::is_denied`] first.
    pub fn branch_filter(&self) -> Option<BranchId> {
        match self {
            AccessDecision::AllowOwnBranch(own) => Some(*own),
            _ => None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessDecision::Deny)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role {role} may not perform '{operation}'")]
    Forbidden { role: Role, operation: Operation },

    #[error("forbidden: '{operation}' is limited to your own branch")]
    BranchMismatch { operation: Operation },

    #[error("forbidden: role {role} is not assigned to a branch")]
    NoBranchAssigned { role: Role },
}

/// Reach of a role for one operation, before the caller's branch is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Reach {
    All,
    OwnBranch,
    None,
}

/// The decision table. One row per role, one column per operation.
fn reach(role: Role, operation: Operation) -> Reach {
    use Operation::*;

    match role {
        Role::SuperAdmin | Role::Admin => Reach::All,
        Role::BranchManager => match operation {
            DeleteInvoice | AdjustPricing => Reach::None,
            ReadInvoice | CreateInvoice | UpdateInvoice | CancelInvoice | ReadPayment
            | CreatePayment | ViewDashboard | SubscribeFeed => Reach::OwnBranch,
        },
        Role::Counter | Role::Waiter => match operation {
            ReadInvoice | CreateInvoice | ReadPayment | CreatePayment | SubscribeFeed => {
                Reach::OwnBranch
            }
            UpdateInvoice | CancelInvoice | DeleteInvoice | AdjustPricing | ViewDashboard => {
                Reach::None
            }
        },
        Role::Kitchen => match operation {
            SubscribeFeed => Reach::OwnBranch,
            _ => Reach::None,
        },
    }
}

/// Evaluate the access policy for `caller` performing `operation`.
///
/// - No IO
/// - No panics
/// - A branch-bound role without a branch is denied (never widened to all branches)
pub fn evaluate(caller: &Caller, operation: Operation) -> AccessDecision {
    match reach(caller.effective_role(), operation) {
        Reach::All => AccessDecision::AllowAll,
        Reach::OwnBranch => match caller.branch_id {
            Some(branch) => AccessDecision::AllowOwnBranch(branch),
            None => AccessDecision::Deny,
        },
        Reach::None => AccessDecision::Deny,
    }
}

/// Evaluate and turn a denial into an error.
pub fn authorize(caller: &Caller, operation: Operation) -> Result<AccessDecision, AuthzError> {
    let decision = evaluate(caller, operation);
    if !decision.is_denied() {
        return Ok(decision);
    }

    let role = caller.effective_role();
    tracing::debug!(user_id = %caller.user_id, %role, %operation, "access denied");
    if reach(role, operation) == Reach::OwnBranch {
        Err(AuthzError::NoBranchAssigned { role })
    } else {
        Err(AuthzError::Forbidden { role, operation })
    }
}

/// Authorize `operation` on a specific branch.
pub fn authorize_branch(
    caller: &Caller,
    operation: Operation,
    branch: BranchId,
) -> Result<AccessDecision, AuthzError> {
    let decision = authorize(caller, operation)?;
    if decision.permits(branch) {
        Ok(decision)
    } else {
        Err(AuthzError::BranchMismatch { operation })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable description of what a caller may do.
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub role: Role,
    pub branch_id: Option<BranchId>,
    pub is_superuser: bool,
    pub operations: Vec<OperationAccess>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationAccess {
    pub operation: Operation,
    pub decision: AccessDecision,
    pub reason: String,
}

/// Explain the decision for every operation.
pub fn explain_access(caller: &Caller) -> AccessExplanation {
    let role = caller.effective_role();
    let operations = Operation::ALL
        .iter()
        .map(|&operation| {
            let decision = evaluate(caller, operation);
            let reason = match (reach(role, operation), decision) {
                (Reach::All, _) => format!("{role} may {operation} in every branch"),
                (Reach::OwnBranch, AccessDecision::AllowOwnBranch(b)) => {
                    format!("{role} may {operation} in branch {b} only")
                }
                (Reach::OwnBranch, _) => {
                    format!("{role} needs an assigned branch to {operation}")
                }
                (Reach::None, _) => format!("{role} may not {operation}"),
            };
            OperationAccess {
                operation,
                decision,
                reason,
            }
        })
        .collect();

    AccessExplanation {
        role,
        branch_id: caller.branch_id,
        is_superuser: caller.is_superuser,
        operations,
    }
}
