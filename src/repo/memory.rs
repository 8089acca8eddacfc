//! In-memory store for tests and local experiments.
//!
//! A single mutex guards every table, so each trait method is atomic in the
//! same way a database transaction is. Uniqueness and foreign-key rules mirror
//! the SQL schema under `migrations/`.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    CredentialStore, DocumentRepo, GrantRepo, ListQuery, RemovedDocument, StoreError,
    StoreResult, TokenRepo,
};
use crate::models::{Document, NewSession, Session, User};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    sessions: HashMap<String, Session>,
    documents: HashMap<Uuid, Document>,
    grants: BTreeSet<(Uuid, String)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.tables.lock().documents.len()
    }

    pub fn grant_count(&self) -> usize {
        self.tables.lock().grants.len()
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().sessions.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert_user(&self, login: &str, password_hash: &str) -> StoreResult<Uuid> {
        let mut tables = self.tables.lock();
        if tables.users.contains_key(login) {
            return Err(StoreError::UniqueViolation);
        }
        let user = User {
            id: Uuid::new_v4(),
            login: login.to_owned(),
            password_hash: password_hash.to_owned(),
            created_at: Utc::now(),
        };
        let id = user.id;
        tables.users.insert(user.login.clone(), user);
        Ok(id)
    }

    async fn find_user(&self, login: &str) -> StoreResult<User> {
        self.tables
            .lock()
            .users
            .get(login)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl TokenRepo for MemoryStore {
    async fn find_by_login(&self, login: &str) -> StoreResult<Session> {
        self.tables
            .lock()
            .sessions
            .get(login)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Session> {
        self.tables
            .lock()
            .sessions
            .values()
            .find(|session| session.token == token)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_session(&self, session: NewSession) -> StoreResult<Session> {
        let mut tables = self.tables.lock();
        if !tables.users.contains_key(&session.login) {
            return Err(StoreError::ForeignKeyViolation);
        }
        if tables.sessions.contains_key(&session.login)
            || tables.sessions.values().any(|s| s.token == session.token)
        {
            return Err(StoreError::UniqueViolation);
        }
        let stored = Session {
            login: session.login,
            token: session.token,
            valid_until: session.valid_until,
            created_at: Utc::now(),
        };
        tables.sessions.insert(stored.login.clone(), stored.clone());
        Ok(stored)
    }

    async fn extend_session(&self, token: &str, valid_until: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let session = tables
            .sessions
            .values_mut()
            .find(|session| session.token == token)
            .ok_or(StoreError::NotFound)?;
        session.valid_until = valid_until;
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let login = tables
            .sessions
            .values()
            .find(|session| session.token == token)
            .map(|session| session.login.clone())
            .ok_or(StoreError::NotFound)?;
        tables.sessions.remove(&login);
        Ok(())
    }
}

#[async_trait]
impl DocumentRepo for MemoryStore {
    async fn create_with_grants(
        &self,
        document: Document,
        grantees: &[String],
    ) -> StoreResult<Uuid> {
        let mut tables = self.tables.lock();
        if !tables.users.contains_key(&document.owner) {
            return Err(StoreError::ForeignKeyViolation);
        }
        if tables.documents.contains_key(&document.id) {
            return Err(StoreError::UniqueViolation);
        }
        if grantees.iter().any(|login| !tables.users.contains_key(login)) {
            return Err(StoreError::ForeignKeyViolation);
        }
        let mut seen = BTreeSet::new();
        if !grantees.iter().all(|login| seen.insert(login)) {
            return Err(StoreError::UniqueViolation);
        }

        let id = document.id;
        for login in grantees {
            tables.grants.insert((id, login.clone()));
        }
        tables.documents.insert(id, document);
        Ok(id)
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Document> {
        self.tables
            .lock()
            .documents
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_owned(&self, id: Uuid, owner: &str) -> StoreResult<RemovedDocument> {
        let mut tables = self.tables.lock();
        match tables.documents.get(&id) {
            Some(doc) if doc.owner == owner => {}
            _ => return Err(StoreError::NotFound),
        }
        let doc = tables.documents.remove(&id).ok_or(StoreError::NotFound)?;
        tables.grants.retain(|(document_id, _)| *document_id != id);
        Ok(RemovedDocument {
            id: doc.id,
            title: doc.title,
            storage_key: doc.storage_key,
            is_file: doc.is_file,
        })
    }

    async fn list_documents(&self, query: &ListQuery) -> StoreResult<Vec<Document>> {
        let tables = self.tables.lock();
        let mut docs: Vec<Document> = tables
            .documents
            .values()
            .filter(|doc| doc.owner == query.owner)
            .filter(|doc| !query.public_only || doc.is_public)
            .filter(|doc| query.filter.as_ref().map_or(true, |f| f.matches(doc)))
            .cloned()
            .collect();
        docs.sort_by(|a, b| {
            a.title
                .cmp(&b.title)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }
}

#[async_trait]
impl GrantRepo for MemoryStore {
    async fn grants_for(&self, document_id: Uuid) -> StoreResult<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .grants
            .iter()
            .filter(|(id, _)| *id == document_id)
            .map(|(_, login)| login.clone())
            .collect())
    }
}
