use serde::Deserialize;

use posledger_auth::Caller;

/// Authenticated caller of a request.
///
/// Inserted by the auth middleware; every ledger route requires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    caller: Caller,
}

impl CallerContext {
    pub fn new(caller: Caller) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }
}

/// `?token=` fallback for clients that cannot set headers (browsers opening
/// WebSockets or `EventSource`).
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}
