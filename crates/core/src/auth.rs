use serde::{Deserialize, Serialize};

/// Principal on whose behalf a legacy-model write is performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUser {
    username: String,
    account: Option<String>,
    admin: bool,
    system: bool,
    active: bool,
}

impl RequestUser {
    /// Creates an active, non-admin user for a tenant account.
    #[must_use]
    pub fn new(username: impl Into<String>, account: Option<String>) -> Self {
        Self {
            username: username.into(),
            account,
            admin: false,
            system: false,
            active: true,
        }
    }

    /// Creates a system principal used by background jobs and tooling.
    #[must_use]
    pub fn system(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            account: None,
            admin: true,
            system: true,
            active: true,
        }
    }

    /// Marks the user as a tenant administrator.
    #[must_use]
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// Returns the account number, if the identity carried one.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Returns whether the user administers the tenant.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Returns whether this is a system principal.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Returns whether the user is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}
