//! `natours-auth`: authentication and authorization building blocks.
//!
//! This crate is intentionally decoupled from HTTP and storage: it issues and
//! verifies tokens, hashes passwords and decides role checks, while the API
//! layer wires those decisions into middleware.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod reset;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{AuthzError, Principal, restrict_to};
pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use password::{PasswordError, hash_password, verify_password};
pub use reset::{RESET_TOKEN_TTL_MINUTES, ResetToken};
pub use roles::Role;
pub use token::{Hs256Jwt, JwtValidator, TokenError, TokenIssuer};
pub use user::{NewUser, User, UserPatch};
