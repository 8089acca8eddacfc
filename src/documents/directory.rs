use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::policy::ListScope;
use crate::auth::validation::MAX_LOGIN_LENGTH;
use crate::error::{ServiceError, ServiceResult};
use crate::models::Document;
use crate::repo::{DocumentFilter, DocumentRepo, GrantRepo, ListQuery, RemovedDocument, StoreError};

/// Metadata for a document about to be created.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub mime: String,
    pub content: Option<Value>,
    pub is_public: bool,
    pub is_file: bool,
}

/// A listed document with the logins it was granted to.
#[derive(Debug, Clone, PartialEq)]
pub struct DocEntry {
    pub document: Document,
    pub grants: Vec<String>,
}

#[derive(Clone)]
pub struct DocumentDirectory {
    documents: Arc<dyn DocumentRepo>,
    grants: Arc<dyn GrantRepo>,
}

impl DocumentDirectory {
    pub fn new(documents: Arc<dyn DocumentRepo>, grants: Arc<dyn GrantRepo>) -> Self {
        Self { documents, grants }
    }

    /// Writes the document and its grants atomically. An unknown grantee
    /// leaves nothing behind.
    pub async fn create_document(
        &self,
        new: NewDocument,
        owner: &str,
        grantees: &[String],
    ) -> ServiceResult<Document> {
        // No stored login can be empty or wider than the login column.
        if grantees
            .iter()
            .any(|login| login.is_empty() || login.chars().count() > MAX_LOGIN_LENGTH)
        {
            info!(owner = %owner, "document rejected: malformed grantee");
            return Err(ServiceError::invalid_input("bad grants"));
        }

        let mut seen = HashSet::new();
        let grantees: Vec<String> = grantees
            .iter()
            .filter(|login| seen.insert(login.as_str()))
            .cloned()
            .collect();

        let id = Uuid::new_v4();
        let document = Document {
            id,
            title: new.title,
            mime: new.mime,
            content: new.content,
            storage_key: id.to_string(),
            owner: owner.to_string(),
            is_public: new.is_public,
            is_file: new.is_file,
            // Postgres keeps microseconds; truncate so filters on the
            // returned value match what is stored.
            created_at: Utc::now().trunc_subsecs(6),
        };

        match self
            .documents
            .create_with_grants(document.clone(), &grantees)
            .await
        {
            Ok(_) => {
                info!(document_id = %id, owner = %owner, grants = grantees.len(), "document created");
                Ok(document)
            }
            Err(StoreError::ForeignKeyViolation) => {
                info!(owner = %owner, "document rejected: unknown grantee");
                Err(ServiceError::invalid_input("bad grants"))
            }
            Err(StoreError::UniqueViolation) => Err(ServiceError::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    /// Owner-conditional. A foreign document and a missing one both give
    /// `NotFound`.
    pub async fn delete_document(&self, id: Uuid, requester: &str) -> ServiceResult<RemovedDocument> {
        let removed = self.documents.delete_owned(id, requester).await?;
        info!(document_id = %id, owner = %requester, "document deleted");
        Ok(removed)
    }

    pub async fn get_document(&self, id: Uuid) -> ServiceResult<Document> {
        Ok(self.documents.get_document(id).await?)
    }

    pub async fn list_documents(
        &self,
        scope: &ListScope,
        filter: Option<DocumentFilter>,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<DocEntry>> {
        let query = ListQuery {
            owner: scope.owner().to_string(),
            public_only: scope.public_only(),
            filter,
            limit: limit.filter(|limit| *limit > 0),
        };
        let documents = self.documents.list_documents(&query).await?;

        let mut entries = Vec::with_capacity(documents.len());
        for document in documents {
            let grants = match self.grants.grants_for(document.id).await {
                Ok(grants) => grants,
                Err(err) => {
                    warn!(document_id = %document.id, error = %err, "failed to load grants");
                    Vec::new()
                }
            };
            entries.push(DocEntry { document, grants });
        }
        Ok(entries)
    }
}

/// Turns a `key`/`value` query pair into a listing filter.
///
/// No key means no filter. An unknown key is `NotFound`; a value that does
/// not parse for its column is `InvalidInput`.
pub fn parse_filter(key: Option<&str>, value: Option<&str>) -> ServiceResult<Option<DocumentFilter>> {
    let key = match key.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(key) => key,
    };
    let value = value.unwrap_or_default();

    let filter = match key {
        "id" => DocumentFilter::Id(
            Uuid::parse_str(value)
                .map_err(|_| ServiceError::invalid_input(format!("invalid id {value:?}")))?,
        ),
        "title" | "name" => DocumentFilter::Title(value.to_string()),
        "mime" => DocumentFilter::Mime(value.to_string()),
        "is_file" | "file" => DocumentFilter::IsFile(parse_flag(key, value)?),
        "is_public" | "public" => DocumentFilter::IsPublic(parse_flag(key, value)?),
        "created_at" | "created" => DocumentFilter::CreatedAt(
            DateTime::parse_from_rfc3339(value)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|_| ServiceError::invalid_input(format!("invalid timestamp {value:?}")))?,
        ),
        _ => return Err(ServiceError::NotFound),
    };
    Ok(Some(filter))
}

fn parse_flag(key: &str, value: &str) -> ServiceResult<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ServiceError::invalid_input(format!(
            "{key} expects true or false, got {value:?}"
        ))),
    }
}
