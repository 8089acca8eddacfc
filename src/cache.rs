//! Read-through response cache.
//!
//! Successful `GET` responses are kept per URI and presented credential for
//! a fixed TTL. Any successful mutating request drops the whole cache before
//! its response leaves the middleware.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{error::AppError, state::AppState};

pub const DEFAULT_MAX_ENTRIES: usize = 1024;
/// Bodies above this size are served but never cached.
pub const MAX_CACHED_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

struct Entry {
    response: CachedResponse,
    stored_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
}

pub struct ResponseCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl,
            max_entries,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let inner = self.inner.read();
        let entry = inner.entries.get(key)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.response.clone())
    }

    pub fn insert(&self, key: String, response: CachedResponse) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.inner.write();
        let replaced = inner
            .entries
            .insert(
                key.clone(),
                Entry {
                    response,
                    stored_at: Instant::now(),
                },
            )
            .is_some();
        if !replaced {
            inner.order.push_back(key);
        }

        while inner.entries.len() > self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn purge(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(request: &Request) -> String {
    let credential = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    format!("{}|{}", request.uri(), credential)
}

fn body_too_large(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .map_or(false, |len| len > MAX_CACHED_BODY_BYTES)
}

pub async fn response_cache(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let cache = state.cache.as_ref();

    let method = request.method().clone();

    if method == Method::GET && cache.is_enabled() {
        let key = cache_key(&request);
        if let Some(hit) = cache.get(&key) {
            debug!(key = %key, "response cache hit");
            return hit.into_response();
        }

        let response = next.run(request).await;
        if response.status() != StatusCode::OK || body_too_large(response.headers()) {
            return response;
        }

        let (parts, body) = response.into_parts();
        let bytes = match body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to buffer response for caching");
                return AppError::internal().into_response();
            }
        };
        cache.insert(
            key,
            CachedResponse {
                status: parts.status,
                headers: parts.headers.clone(),
                body: bytes.clone(),
            },
        );
        return Response::from_parts(parts, Body::from(bytes));
    }

    let response = next.run(request).await;
    let safe = method == Method::GET || method == Method::HEAD || method == Method::OPTIONS;
    if !safe && response.status().is_success() {
        debug!(method = %method, "mutation succeeded, purging response cache");
        cache.purge();
    }
    response
}
