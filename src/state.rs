use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::{
    auth::{CredentialService, SessionManager},
    cache::ResponseCache,
    config::AppConfig,
    documents::{DocumentDirectory, DocumentService},
    repo::Repository,
    storage::BlobStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: CredentialService,
    pub sessions: SessionManager,
    pub documents: DocumentService,
    pub cache: Arc<ResponseCache>,
}

impl AppState {
    /// Wires every service onto one backing store and one blob store.
    pub fn new<R>(config: AppConfig, repo: Arc<R>, blobs: Arc<dyn BlobStore>) -> Self
    where
        R: Repository,
    {
        let credentials = CredentialService::new(repo.clone(), config.admin_token.clone());
        let sessions = SessionManager::new(
            repo.clone(),
            credentials.clone(),
            Duration::hours(config.session_ttl_hours),
        );
        let directory = DocumentDirectory::new(repo.clone(), repo);
        let documents = DocumentService::new(sessions.clone(), directory, blobs);
        let cache = Arc::new(ResponseCache::new(StdDuration::from_secs(
            config.cache_ttl_seconds,
        )));

        Self {
            config: Arc::new(config),
            credentials,
            sessions,
            documents,
            cache,
        }
    }
}
