use axum::body::Body;
use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};
use uuid::Uuid;

use super::auth::{flag, Envelope};
use crate::auth::RequestToken;
use crate::documents::{DocEntry, FetchedDocument, ListRequest, UploadMeta};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

fn attachment_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    let ascii_fallback: String = sanitized
        .chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback, encoded
    )
}

#[derive(Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub json: Value,
    pub file: String,
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub docs: Vec<DocumentResponse>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub file: bool,
    pub public: bool,
    pub created: DateTime<Utc>,
    pub grant: Vec<String>,
}

impl From<DocEntry> for DocumentResponse {
    fn from(entry: DocEntry) -> Self {
        let doc = entry.document;
        Self {
            id: doc.id,
            name: doc.title,
            mime: doc.mime,
            file: doc.is_file,
            public: doc.is_public,
            created: doc.created_at,
            grant: entry.grants,
        }
    }
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub login: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<String>,
}

pub async fn upload_document(
    State(state): State<AppState>,
    token: RequestToken,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataEnvelope<UploadResponse>>)> {
    let mut meta: Option<UploadMeta> = None;
    let mut json_part: Option<Bytes> = None;
    let mut file_part: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("meta") => {
                let data = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read meta: {err}"))
                })?;
                meta = Some(serde_json::from_slice(&data).map_err(|err| {
                    info!(error = %err, "upload rejected: meta is not valid");
                    AppError::bad_request(format!("meta must be valid JSON: {err}"))
                })?);
            }
            Some("json") => {
                json_part = Some(field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read json: {err}"))
                })?);
            }
            Some("file") => {
                file_part = Some(field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?);
            }
            _ => {}
        }
    }

    let meta = meta.ok_or_else(|| AppError::bad_request("no 'meta' in multipart/form"))?;
    let payload = if meta.file {
        file_part.ok_or_else(|| AppError::bad_request("no 'file' in multipart/form"))?
    } else {
        json_part
            .or(file_part)
            .ok_or_else(|| AppError::bad_request("no 'json' in multipart/form"))?
    };

    let token = match token.as_str() {
        "" => meta.token.clone().unwrap_or_default(),
        token => token.to_string(),
    };
    // The session layer defers to this handler when the token is in `meta`.
    state.sessions.validate_token(&token).await.map_err(|err| {
        info!(error = %err, "upload rejected");
        AppError::from(err)
    })?;

    let document = state
        .documents
        .upload(&token, meta, payload)
        .await
        .map_err(|err| {
            info!(error = %err, "document upload failed");
            AppError::from(err)
        })?;
    info!(document_id = %document.id, owner = %document.owner, "document upload succeeded");

    let response = UploadResponse {
        id: document.id,
        json: document
            .content
            .unwrap_or_else(|| Value::Object(Map::new())),
        file: document.title,
    };
    Ok((StatusCode::CREATED, Json(DataEnvelope { data: response })))
}

pub async fn list_documents(
    State(state): State<AppState>,
    token: RequestToken,
    Query(params): Query<DocumentListQuery>,
) -> AppResult<Json<DataEnvelope<DocumentListResponse>>> {
    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| AppError::bad_request("limit must be a non-negative integer"))?,
        ),
    };

    let request = ListRequest {
        target: params.login,
        key: params.key,
        value: params.value,
        limit,
    };
    let entries = state.documents.list(token.as_str(), request).await?;

    Ok(Json(DataEnvelope {
        data: DocumentListResponse {
            docs: entries.into_iter().map(DocumentResponse::from).collect(),
        },
    }))
}

pub async fn get_document(
    State(state): State<AppState>,
    token: RequestToken,
    Path(id): Path<String>,
) -> AppResult<Response> {
    match state.documents.fetch(token.as_str(), &id).await? {
        FetchedDocument::Json(value) => Ok(Json(json!({ "data": value })).into_response()),
        FetchedDocument::File { title, mime, bytes } => {
            let content_type = HeaderValue::from_str(&mime)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            let disposition = HeaderValue::from_str(&attachment_content_disposition(&title))
                .map_err(|err| AppError::from(anyhow::Error::new(err)))?;

            let mut response = Response::new(Body::from(bytes));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, content_type);
            headers.insert(header::CONTENT_DISPOSITION, disposition);
            Ok(response)
        }
    }
}

pub async fn delete_document(
    State(state): State<AppState>,
    token: RequestToken,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<Map<String, Value>>>> {
    let removed = state.documents.delete(token.as_str(), &id).await?;
    info!(document_id = %removed.id, title = %removed.title, "document removed");

    Ok(Json(Envelope {
        response: flag(removed.id.to_string()),
    }))
}
