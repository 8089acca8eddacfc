//! Persistence capabilities used by the services.
//!
//! Each component talks to its own trait; [`PgStore`] and [`MemoryStore`]
//! implement all of them. Operations that must be atomic (document plus
//! grants, owner-conditional delete) are single trait methods so callers
//! never have to reach for a transaction handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Document, NewSession, Session, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error("foreign key constraint violated")]
    ForeignKeyViolation,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match value {
            Error::NotFound => StoreError::NotFound,
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                StoreError::UniqueViolation
            }
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                StoreError::ForeignKeyViolation
            }
            other => StoreError::Backend(anyhow::Error::new(other)),
        }
    }
}

/// Equality predicate accepted by document listings.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    Id(Uuid),
    Title(String),
    Mime(String),
    IsFile(bool),
    IsPublic(bool),
    CreatedAt(DateTime<Utc>),
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            DocumentFilter::Id(id) => doc.id == *id,
            DocumentFilter::Title(title) => doc.title == *title,
            DocumentFilter::Mime(mime) => doc.mime == *mime,
            DocumentFilter::IsFile(is_file) => doc.is_file == *is_file,
            DocumentFilter::IsPublic(is_public) => doc.is_public == *is_public,
            DocumentFilter::CreatedAt(created_at) => doc.created_at == *created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub owner: String,
    pub public_only: bool,
    pub filter: Option<DocumentFilter>,
    pub limit: Option<usize>,
}

/// What is left of a document after an owner-conditional delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedDocument {
    pub id: Uuid,
    pub title: String,
    pub storage_key: String,
    pub is_file: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Fails with `UniqueViolation` when the login is taken.
    async fn insert_user(&self, login: &str, password_hash: &str) -> StoreResult<Uuid>;

    async fn find_user(&self, login: &str) -> StoreResult<User>;
}

#[async_trait]
pub trait TokenRepo: Send + Sync + 'static {
    async fn find_by_login(&self, login: &str) -> StoreResult<Session>;

    async fn find_by_token(&self, token: &str) -> StoreResult<Session>;

    /// Fails with `UniqueViolation` if the login already has a session or the
    /// token value is taken.
    async fn insert_session(&self, session: NewSession) -> StoreResult<Session>;

    /// Moves `valid_until` of the session holding `token`; `NotFound` if none does.
    async fn extend_session(&self, token: &str, valid_until: DateTime<Utc>) -> StoreResult<()>;

    async fn delete_session(&self, token: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait DocumentRepo: Send + Sync + 'static {
    /// Inserts the document and one grant per login in a single atomic unit.
    /// An unknown grantee yields `ForeignKeyViolation` and nothing is kept.
    async fn create_with_grants(&self, document: Document, grantees: &[String])
        -> StoreResult<Uuid>;

    async fn get_document(&self, id: Uuid) -> StoreResult<Document>;

    /// Removes the document and its grants only when `owner` matches.
    async fn delete_owned(&self, id: Uuid, owner: &str) -> StoreResult<RemovedDocument>;

    /// Ordered by `(title, created_at)` ascending.
    async fn list_documents(&self, query: &ListQuery) -> StoreResult<Vec<Document>>;
}

#[async_trait]
pub trait GrantRepo: Send + Sync + 'static {
    async fn grants_for(&self, document_id: Uuid) -> StoreResult<Vec<String>>;
}

/// Everything the application needs from a single backing store.
pub trait Repository: CredentialStore + TokenRepo + DocumentRepo + GrantRepo {}

impl<T> Repository for T where T: CredentialStore + TokenRepo + DocumentRepo + GrantRepo {}
