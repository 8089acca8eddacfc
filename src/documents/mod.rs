//! Document upload, listing, retrieval and removal.
//!
//! Every operation resolves the caller from its token, asks [`policy`] for a
//! decision against directory state and only then touches the blob store.

pub mod directory;
pub mod policy;

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::SessionManager;
use crate::error::{ServiceError, ServiceResult};
use crate::models::Document;
use crate::repo::RemovedDocument;
use crate::storage::{BlobNamespace, BlobStore};

pub use directory::{parse_filter, DocEntry, DocumentDirectory, NewDocument};
pub use policy::ListScope;

pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_MIME_LENGTH: usize = 255;
pub const JSON_MIME: &str = "application/json";

/// The `meta` part of an upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadMeta {
    pub name: String,
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub grant: Vec<String>,
    /// Session token for form clients that cannot set headers. Used only
    /// when the request carries no bearer or query token.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FetchedDocument {
    File {
        title: String,
        mime: String,
        bytes: Bytes,
    },
    Json(Value),
}

#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub target: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct DocumentService {
    sessions: SessionManager,
    directory: DocumentDirectory,
    blobs: Arc<dyn BlobStore>,
}

impl DocumentService {
    pub fn new(
        sessions: SessionManager,
        directory: DocumentDirectory,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            sessions,
            directory,
            blobs,
        }
    }

    pub fn directory(&self) -> &DocumentDirectory {
        &self.directory
    }

    pub async fn upload(
        &self,
        token: &str,
        meta: UploadMeta,
        payload: Bytes,
    ) -> ServiceResult<Document> {
        let new = prepare_document(&meta, &payload)?;
        let owner = self.identify(token).await?;
        policy::authorize_upload(&owner)?;

        let document = self
            .directory
            .create_document(new, &owner, &meta.grant)
            .await?;

        let namespace = BlobNamespace::for_document(document.is_file);
        if let Err(err) = self
            .blobs
            .store(namespace, &document.storage_key, payload)
            .await
        {
            error!(document_id = %document.id, error = %err, "failed to store document payload");
            if let Err(cleanup) = self.directory.delete_document(document.id, &owner).await {
                warn!(document_id = %document.id, error = %cleanup, "failed to remove orphaned document");
            }
            return Err(ServiceError::Internal(
                anyhow::Error::new(err).context("failed to store document payload"),
            ));
        }

        Ok(document)
    }

    pub async fn list(&self, token: &str, request: ListRequest) -> ServiceResult<Vec<DocEntry>> {
        let requester = self.identify(token).await?;
        let filter = parse_filter(request.key.as_deref(), request.value.as_deref())?;
        let scope = policy::list_scope(&requester, request.target.as_deref());
        self.directory
            .list_documents(&scope, filter, request.limit)
            .await
    }

    pub async fn fetch(&self, token: &str, id: &str) -> ServiceResult<FetchedDocument> {
        let requester = self.identify(token).await?;
        let id = parse_document_id(id)?;
        let document = self.directory.get_document(id).await?;
        policy::authorize_read(&requester, &document)?;

        let namespace = BlobNamespace::for_document(document.is_file);
        let bytes = self
            .blobs
            .retrieve(namespace, &document.storage_key)
            .await?;

        if document.is_file {
            return Ok(FetchedDocument::File {
                title: document.title,
                mime: document.mime,
                bytes,
            });
        }

        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("stored JSON for document {id} is corrupt"))?;
        Ok(FetchedDocument::Json(value))
    }

    pub async fn delete(&self, token: &str, id: &str) -> ServiceResult<RemovedDocument> {
        let requester = self.identify(token).await?;
        let id = parse_document_id(id)?;
        let document = self.directory.get_document(id).await?;
        policy::authorize_delete(&requester, &document)?;

        let removed = self.directory.delete_document(id, &requester).await?;

        let namespace = BlobNamespace::for_document(removed.is_file);
        if let Err(err) = self.blobs.remove(namespace, &removed.storage_key).await {
            // Metadata is gone already; the orphaned payload is only reported.
            warn!(document_id = %id, error = %err, "failed to remove document payload");
        } else {
            info!(document_id = %id, "document payload removed");
        }

        Ok(removed)
    }

    async fn identify(&self, token: &str) -> ServiceResult<String> {
        match self.sessions.resolve_login(token).await {
            Err(ServiceError::NotFound) => Err(ServiceError::InvalidToken),
            other => other,
        }
    }
}

/// Ids that are not UUIDs cannot name a document.
fn parse_document_id(raw: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::NotFound)
}

fn prepare_document(meta: &UploadMeta, payload: &[u8]) -> ServiceResult<NewDocument> {
    let title = meta.name.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ServiceError::invalid_input(format!(
            "name must be between 1 and {MAX_TITLE_LENGTH} characters"
        )));
    }

    let mime = meta
        .mime
        .as_deref()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_string);
    if let Some(mime) = &mime {
        check_mime(mime)?;
    }

    if meta.file {
        return Ok(NewDocument {
            title: title.to_string(),
            mime: mime.unwrap_or_else(|| {
                mime_guess::from_path(title)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            }),
            content: None,
            is_public: meta.public,
            is_file: true,
        });
    }

    let content: Value = serde_json::from_slice(payload)
        .map_err(|err| ServiceError::invalid_input(format!("json payload is not valid: {err}")))?;
    Ok(NewDocument {
        title: title.to_string(),
        mime: mime.unwrap_or_else(|| JSON_MIME.to_string()),
        content: Some(content),
        is_public: meta.public,
        is_file: false,
    })
}

/// A declared mime is stored as-is and later sent back as `Content-Type`.
fn check_mime(mime: &str) -> ServiceResult<()> {
    if mime.len() > MAX_MIME_LENGTH {
        return Err(ServiceError::invalid_input(format!(
            "mime must be at most {MAX_MIME_LENGTH} characters"
        )));
    }
    let visible = mime.bytes().all(|b| b == b' ' || b.is_ascii_graphic());
    if !visible || HeaderValue::from_str(mime).is_err() {
        return Err(ServiceError::invalid_input(format!("invalid mime {mime:?}")));
    }
    Ok(())
}
