//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant except [`DomainError::Internal`] is an expected, operational
/// outcome whose message is safe to show to the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// One or more fields failed validation.
    #[error("Invalid input data. {}", .0.join(". "))]
    Validation(Vec<String>),

    /// A value could not be read as the type its field requires.
    #[error("Invalid {path}: {value}.")]
    Cast { path: String, value: String },

    /// No document matched an id (after base scoping).
    #[error("{0}")]
    NotFound(String),

    /// A unique field (or field combination) is already taken.
    #[error("Duplicate field value: \"{value}\". Please use another value.")]
    Duplicate { field: String, value: String },

    /// A request that is well-formed JSON but not acceptable for the route.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    /// Anything unexpected. Never shown verbatim in production.
    #[error("{0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn cast(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Cast {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `No tour found with that ID`
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("No {resource} found with that ID"))
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Accumulates validation messages so a client sees every problem at once.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` unless `ok`.
    pub fn check(&mut self, ok: bool, message: impl Into<String>) {
        if !ok {
            self.0.push(message.into());
        }
    }

    /// Unwrap a required field, recording `message` when it is absent.
    pub fn require<T>(&mut self, value: Option<T>, message: &str) -> Option<T> {
        if value.is_none() {
            self.0.push(message.to_string());
        }
        value
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn finish(self) -> DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self.0))
        }
    }
}
