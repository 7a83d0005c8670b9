//! User accounts.
//!
//! A user document holds the password hash and reset-token digest alongside
//! the public profile; those fields are marked private on the resource and
//! never leave the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use natours_core::{DocumentId, DomainError, DomainResult, Resource, Violations};
use natours_query::FilterClause;

use crate::password::{hash_password, verify_password};
use crate::reset::ResetToken;
use crate::{Principal, Role};

pub const MIN_PASSWORD_LEN: usize = 8;

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// A registered user.
///
/// # Invariants
/// - `email` is lowercase, trimmed and unique.
/// - `password` is always an Argon2 PHC hash, never plain text.
/// - `password_changed_at` is only set by a password change, never on signup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: DocumentId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub password: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "natours_core::timestamp::option"
    )]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_token: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "natours_core::timestamp::option"
    )]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

/// Signup / admin-create body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
    #[serde(alias = "passwordConfirm")]
    pub confirm_password: Option<String>,
}

/// Admin update body. Passwords are changed only through the password routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id,
            role: self.role.clone(),
        }
    }

    pub fn correct_password(&self, candidate: &str) -> bool {
        verify_password(candidate, &self.password)
    }

    /// Whether the password changed after a token issued at `issued_at_ms`
    /// (epoch milliseconds), which makes that token stale.
    pub fn changed_password_after(&self, issued_at_ms: i64) -> bool {
        self.password_changed_at
            .map(|changed| issued_at_ms < changed.timestamp_millis())
            .unwrap_or(false)
    }

    /// Replace the password and stamp the change with `now`.
    pub fn set_password(
        &mut self,
        password: Option<String>,
        confirm_password: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut v = Violations::new();
        let password = v.require(password, "Please provide a password");
        let confirm = v.require(confirm_password, "Please confirm your password");
        if let Some(p) = &password {
            check_password(&mut v, p, confirm.as_deref());
        }
        v.finish()?;

        let password = password.unwrap_or_default();
        self.password = hash(&password)?;
        self.password_changed_at = Some(now);
        self.clear_password_reset();
        Ok(())
    }

    /// Start a password reset; returns the plain token to email out.
    pub fn create_password_reset_token(&mut self, now: DateTime<Utc>) -> String {
        let token = ResetToken::generate(now);
        self.password_reset_token = Some(token.digest);
        self.password_reset_expires = Some(token.expires_at);
        token.plain
    }

    pub fn reset_token_valid(&self, now: DateTime<Utc>) -> bool {
        self.password_reset_expires
            .map(|expires| expires > now)
            .unwrap_or(false)
    }

    pub fn clear_password_reset(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }

    /// Self-service profile update: only name and email.
    pub fn update_profile(&mut self, name: Option<String>, email: Option<String>) -> DomainResult<()> {
        if let Some(name) = name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = email {
            self.email = normalize_email(&email);
        }
        self.validate()
    }

    /// Soft delete: the account disappears from every query.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

impl Resource for User {
    type Draft = NewUser;
    type Patch = UserPatch;

    const COLLECTION: &'static str = "users";
    const NAME: &'static str = "user";
    const DEFAULT_SORT: Option<&'static str> = None;
    const INTERNAL_FIELDS: &'static [&'static str] = &["passwordChangedAt"];
    const PRIVATE_FIELDS: &'static [&'static str] = &[
        "password",
        "passwordResetToken",
        "passwordResetExpires",
        "active",
    ];
    const UNIQUE_INDEXES: &'static [&'static [&'static str]] = &[&["email"]];

    fn id(&self) -> DocumentId {
        self.id
    }

    fn create(draft: NewUser, id: DocumentId, _now: DateTime<Utc>) -> DomainResult<Self> {
        let mut v = Violations::new();
        let name = v.require(
            draft.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            "Please tell us your name!",
        );
        let email = v.require(
            draft.email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty()),
            "Please provide your email",
        );
        if let Some(email) = &email {
            v.check(is_valid_email(email), "Please provide a valid email");
        }
        let password = v.require(draft.password, "Please provide a password");
        let confirm = v.require(draft.confirm_password, "Please confirm your password");
        if let Some(p) = &password {
            check_password(&mut v, p, confirm.as_deref());
        }
        let role = draft.role.unwrap_or_default();
        v.check(role.is_known(), ROLE_MESSAGE);
        v.finish()?;

        let (Some(name), Some(email), Some(password)) = (name, email, password) else {
            return Err(DomainError::internal("user draft passed validation with missing fields"));
        };

        Ok(Self {
            id,
            name,
            email,
            photo: draft.photo,
            role,
            password: hash(&password)?,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
        })
    }

    fn apply_patch(&mut self, patch: UserPatch, _now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(email) = patch.email {
            self.email = normalize_email(&email);
        }
        if let Some(photo) = patch.photo {
            self.photo = Some(photo);
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        self.validate()
    }

    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(!self.name.is_empty(), "Please tell us your name!");
        v.check(is_valid_email(&self.email), "Please provide a valid email");
        v.check(self.role.is_known(), ROLE_MESSAGE);
        v.check(!self.password.is_empty(), "Please provide a password");
        v.finish()
    }

    fn base_scope() -> Vec<FilterClause> {
        vec![FilterClause::ne("active", false)]
    }
}

const ROLE_MESSAGE: &str = "Role is either: user, guide, lead-guide, admin";

fn check_password(v: &mut Violations, password: &str, confirm: Option<&str>) {
    v.check(
        password.chars().count() >= MIN_PASSWORD_LEN,
        format!("Password must have at least {MIN_PASSWORD_LEN} characters"),
    );
    if let Some(confirm) = confirm {
        v.check(confirm == password, "Passwords are not the same.");
    }
}

fn hash(password: &str) -> DomainResult<String> {
    hash_password(password).map_err(|e| DomainError::internal(e.to_string()))
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
