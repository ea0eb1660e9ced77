use std::collections::HashMap;

use crate::domain::ids::UserId;

/// Lookup for human-readable user names. Routing falls back to the raw user
/// id when a directory has no entry.
pub trait Directory: Send + Sync {
    fn display_name(&self, user: &UserId) -> Option<String>;
}

/// Map-backed directory for tests and embedded use.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    names: HashMap<UserId, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(UserId(user.into()), name.into());
        self
    }
}

impl Directory for InMemoryDirectory {
    fn display_name(&self, user: &UserId) -> Option<String> {
        self.names.get(user).cloned()
    }
}
