use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct Session {
    pub login: String,
    pub token: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub login: String,
    pub token: String,
    pub valid_until: DateTime<Utc>,
}

/// A document row. `content` carries the inline JSON of non-file documents.
#[derive(Debug, Clone, PartialEq, Queryable, Insertable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub mime: String,
    pub content: Option<serde_json::Value>,
    pub storage_key: String,
    pub owner: String,
    pub is_public: bool,
    pub is_file: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Insertable)]
#[diesel(table_name = document_grants)]
pub struct DocumentGrant {
    pub document_id: Uuid,
    pub login: String,
}
