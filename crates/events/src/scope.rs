use serde::{Deserialize, Serialize};

use posledger_core::BranchId;

/// Visibility scope of a live observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Every branch (administrators).
    Global,
    Branch(BranchId),
}

impl Scope {
    pub fn from_branch_filter(branch: Option<BranchId>) -> Self {
        match branch {
            Some(b) => Scope::Branch(b),
            None => Scope::Global,
        }
    }

    pub fn branch(&self) -> Option<BranchId> {
        match self {
            Scope::Global => None,
            Scope::Branch(b) => Some(*b),
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Branch(b) => write!(f, "branch_{b}"),
        }
    }
}

/// Push feed topic. Each live-feed endpoint serves exactly one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    KitchenOrders,
    Orders,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::KitchenOrders, Topic::Orders];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::KitchenOrders => "kitchen_orders",
            Topic::Orders => "orders",
        }
    }
}

/// A broadcast group: one topic seen from one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupName {
    pub topic: Topic,
    pub scope: Scope,
}

impl GroupName {
    pub fn new(topic: Topic, scope: Scope) -> Self {
        Self { topic, scope }
    }
}

impl core::fmt::Display for GroupName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.scope {
            Scope::Global => f.write_str(self.topic.as_str()),
            scope => write!(f, "{}.{scope}", self.topic.as_str()),
        }
    }
}
