//! `natours-core`: domain building blocks shared by every resource.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod resource;
pub mod timestamp;

pub use error::{DomainError, DomainResult, Violations};
pub use id::DocumentId;
pub use resource::{Resource, decode_body};
