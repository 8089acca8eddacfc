use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use super::{
    CredentialStore, DocumentFilter, DocumentRepo, GrantRepo, ListQuery, RemovedDocument,
    StoreError, StoreResult, TokenRepo,
};
use crate::db::PgPool;
use crate::models::{Document, DocumentGrant, NewSession, NewUser, Session, User};
use crate::schema::{document_grants, documents, sessions, users};

/// Diesel-backed store. Every call runs on the blocking pool with its own
/// pooled connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| anyhow!("database task panicked: {err}"))?
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_user(&self, login: &str, password_hash: &str) -> StoreResult<Uuid> {
        let new_user = NewUser {
            id: Uuid::new_v4(),
            login: login.to_owned(),
            password_hash: password_hash.to_owned(),
        };
        self.run(move |conn| {
            diesel::insert_into(users::table)
                .values(&new_user)
                .execute(conn)?;
            Ok(new_user.id)
        })
        .await
    }

    async fn find_user(&self, login: &str) -> StoreResult<User> {
        let login = login.to_owned();
        self.run(move |conn| {
            let user = users::table
                .filter(users::login.eq(&login))
                .first::<User>(conn)?;
            Ok(user)
        })
        .await
    }
}

#[async_trait]
impl TokenRepo for PgStore {
    async fn find_by_login(&self, login: &str) -> StoreResult<Session> {
        let login = login.to_owned();
        self.run(move |conn| {
            Ok(sessions::table
                .filter(sessions::login.eq(&login))
                .first::<Session>(conn)?)
        })
        .await
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Session> {
        let token = token.to_owned();
        self.run(move |conn| {
            Ok(sessions::table
                .filter(sessions::token.eq(&token))
                .first::<Session>(conn)?)
        })
        .await
    }

    async fn insert_session(&self, session: NewSession) -> StoreResult<Session> {
        self.run(move |conn| {
            let stored = diesel::insert_into(sessions::table)
                .values(&session)
                .get_result::<Session>(conn)?;
            Ok(stored)
        })
        .await
    }

    async fn extend_session(&self, token: &str, valid_until: DateTime<Utc>) -> StoreResult<()> {
        let token = token.to_owned();
        self.run(move |conn| {
            let updated = diesel::update(sessions::table.filter(sessions::token.eq(&token)))
                .set(sessions::valid_until.eq(valid_until))
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        let token = token.to_owned();
        self.run(move |conn| {
            let deleted = diesel::delete(sessions::table.filter(sessions::token.eq(&token)))
                .execute(conn)?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DocumentRepo for PgStore {
    async fn create_with_grants(
        &self,
        document: Document,
        grantees: &[String],
    ) -> StoreResult<Uuid> {
        let grants: Vec<DocumentGrant> = grantees
            .iter()
            .map(|login| DocumentGrant {
                document_id: document.id,
                login: login.clone(),
            })
            .collect();

        self.run(move |conn| {
            conn.transaction::<Uuid, StoreError, _>(|conn| {
                diesel::insert_into(documents::table)
                    .values(&document)
                    .execute(conn)?;
                if !grants.is_empty() {
                    diesel::insert_into(document_grants::table)
                        .values(&grants)
                        .execute(conn)?;
                }
                Ok(document.id)
            })
        })
        .await
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Document> {
        self.run(move |conn| Ok(documents::table.find(id).first::<Document>(conn)?))
            .await
    }

    async fn delete_owned(&self, id: Uuid, owner: &str) -> StoreResult<RemovedDocument> {
        let owner = owner.to_owned();
        self.run(move |conn| {
            conn.transaction::<RemovedDocument, StoreError, _>(|conn| {
                let doc = documents::table
                    .filter(documents::id.eq(id))
                    .filter(documents::owner.eq(&owner))
                    .for_update()
                    .first::<Document>(conn)?;

                diesel::delete(document_grants::table.filter(document_grants::document_id.eq(id)))
                    .execute(conn)?;
                diesel::delete(documents::table.find(id)).execute(conn)?;

                Ok(RemovedDocument {
                    id: doc.id,
                    title: doc.title,
                    storage_key: doc.storage_key,
                    is_file: doc.is_file,
                })
            })
        })
        .await
    }

    async fn list_documents(&self, query: &ListQuery) -> StoreResult<Vec<Document>> {
        let query = query.clone();
        self.run(move |conn| {
            let mut statement = documents::table
                .filter(documents::owner.eq(query.owner.clone()))
                .into_boxed();

            if query.public_only {
                statement = statement.filter(documents::is_public.eq(true));
            }

            statement = match query.filter.clone() {
                None => statement,
                Some(DocumentFilter::Id(id)) => statement.filter(documents::id.eq(id)),
                Some(DocumentFilter::Title(title)) => statement.filter(documents::title.eq(title)),
                Some(DocumentFilter::Mime(mime)) => statement.filter(documents::mime.eq(mime)),
                Some(DocumentFilter::IsFile(flag)) => statement.filter(documents::is_file.eq(flag)),
                Some(DocumentFilter::IsPublic(flag)) => {
                    statement.filter(documents::is_public.eq(flag))
                }
                Some(DocumentFilter::CreatedAt(at)) => {
                    statement.filter(documents::created_at.eq(at))
                }
            };

            statement = statement.order((documents::title.asc(), documents::created_at.asc()));
            if let Some(limit) = query.limit {
                statement = statement.limit(i64::try_from(limit).unwrap_or(i64::MAX));
            }

            Ok(statement.load::<Document>(conn)?)
        })
        .await
    }
}

#[async_trait]
impl GrantRepo for PgStore {
    async fn grants_for(&self, document_id: Uuid) -> StoreResult<Vec<String>> {
        self.run(move |conn| {
            Ok(document_grants::table
                .filter(document_grants::document_id.eq(document_id))
                .order(document_grants::login.asc())
                .select(document_grants::login)
                .load::<String>(conn)?)
        })
        .await
    }
}
