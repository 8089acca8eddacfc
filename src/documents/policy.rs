//! Access decisions over a resolved login and document metadata.
//!
//! Nothing here performs I/O. Grants are recorded alongside documents but are
//! not part of any read decision: only ownership and `is_public` count.

use crate::error::{ServiceError, ServiceResult};
use crate::models::Document;

/// Which slice of a user's documents a listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// The requester's own documents, every visibility.
    Own(String),
    /// Another user's public documents.
    PublicOf(String),
}

impl ListScope {
    pub fn owner(&self) -> &str {
        match self {
            ListScope::Own(login) | ListScope::PublicOf(login) => login,
        }
    }

    pub fn public_only(&self) -> bool {
        matches!(self, ListScope::PublicOf(_))
    }
}

/// Uploads are open to any resolved identity; grantee checks happen in the
/// directory.
pub fn authorize_upload(_owner: &str) -> ServiceResult<()> {
    Ok(())
}

/// Someone else's document is reported exactly like a missing one.
pub fn authorize_delete(requester: &str, document: &Document) -> ServiceResult<()> {
    if document.owner == requester {
        Ok(())
    } else {
        Err(ServiceError::NotFound)
    }
}

pub fn authorize_read(requester: &str, document: &Document) -> ServiceResult<()> {
    if document.owner == requester || document.is_public {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}

pub fn list_scope(requester: &str, target: Option<&str>) -> ListScope {
    match target {
        Some(target) if !target.is_empty() && target != requester => {
            ListScope::PublicOf(target.to_string())
        }
        _ => ListScope::Own(requester.to_string()),
    }
}
