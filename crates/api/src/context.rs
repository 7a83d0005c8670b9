use natours_auth::{Principal, Role, User};
use natours_core::DocumentId;

/// The authenticated caller, inserted by `protect` for every protected route.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalContext {
    user: User,
}

impl PrincipalContext {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn into_user(self) -> User {
        self.user
    }

    pub fn user_id(&self) -> DocumentId {
        self.user.id
    }

    pub fn role(&self) -> &Role {
        &self.user.role
    }

    pub fn principal(&self) -> Principal {
        self.user.principal()
    }
}
