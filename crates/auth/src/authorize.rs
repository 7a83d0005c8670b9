use thiserror::Error;

use natours_core::DocumentId;

use crate::Role;

/// The authenticated caller, as far as authorization cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: DocumentId,
    pub role: Role,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("You do not have permission to perform this action")]
    Forbidden,
}

/// Allow the principal only if its role is in `allowed`.
///
/// - No IO
/// - No panics
pub fn restrict_to(principal: &Principal, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}
