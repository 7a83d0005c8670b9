use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role carried by every user; route guards whitelist roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const USER: Role = Role(Cow::Borrowed("user"));
    pub const GUIDE: Role = Role(Cow::Borrowed("guide"));
    pub const LEAD_GUIDE: Role = Role(Cow::Borrowed("lead-guide"));
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));

    /// Every role a user may hold.
    pub const ALL: [Role; 4] = [Self::USER, Self::GUIDE, Self::LEAD_GUIDE, Self::ADMIN];

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        Self::ALL.iter().any(|r| r == self)
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::USER
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
