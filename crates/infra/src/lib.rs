//! Infrastructure layer: document storage, repositories, outgoing email.

pub mod mailer;
pub mod repository;
pub mod store;

pub use mailer::{EmailMessage, LogMailer, MailError, Mailer, OutboxMailer};
pub use repository::{DocumentRepository, Repository, present};
pub use store::{Document, DocumentQuery, DocumentStore, InMemoryDocumentStore, StoreError};
#[cfg(feature = "postgres")]
pub use store::PostgresDocumentStore;
