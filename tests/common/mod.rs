use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use docshare::config::AppConfig;
use docshare::db::{self, PgPool};
use docshare::repo::{MemoryStore, PgStore, Repository};
use docshare::routes;
use docshare::state::AppState;
use docshare::storage::MemoryBlobStore;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use url::form_urlencoded;
use uuid::Uuid;

pub const ADMIN_TOKEN: &str = "test-admin-token";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        admin_token: ADMIN_TOKEN.to_string(),
        session_ttl_hours: 24,
        blob_storage_root: env::temp_dir().join("docshare-tests"),
        cache_ttl_seconds: 120,
        run_migrations: false,
        cors_allowed_origin: None,
        max_upload_bytes: 1024 * 1024,
    }
}

/// One part of a multipart upload.
#[allow(dead_code)]
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    #[allow(dead_code)]
    pub store: Arc<MemoryStore>,
    #[allow(dead_code)]
    pub blobs: Arc<MemoryBlobStore>,
    pool: Option<PgPool>,
}

impl TestApp {
    /// Router over in-memory stores; needs no external services.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        Self::assemble(test_config("postgres://unused/docshare"), store.clone(), store, blobs, None)
    }

    /// Router over Postgres at `TEST_DATABASE_URL`, or `None` when it is unset.
    #[allow(dead_code)]
    pub async fn with_postgres() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            return Ok(None);
        };

        let config = test_config(&database_url);
        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let repo = Arc::new(PgStore::new(pool.clone()));
        Ok(Some(Self::assemble(
            config,
            repo,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Some(pool),
        )))
    }

    fn assemble<R: Repository>(
        config: AppConfig,
        repo: Arc<R>,
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        pool: Option<PgPool>,
    ) -> Self {
        let state = AppState::new(config, repo, blobs.clone());
        let router = routes::create_router(state.clone());
        Self {
            state,
            router,
            store,
            blobs,
            pool,
        }
    }

    #[allow(dead_code)]
    pub fn pool(&self) -> Option<PgPool> {
        self.pool.clone()
    }

    #[allow(dead_code)]
    pub async fn cleanup(&self) -> Result<()> {
        let Some(pool) = self.pool.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)
        })
        .await
        .context("cleanup task panicked")?
    }

    pub async fn register(&self, login: &str, password: &str) -> Result<hyper::Response<Body>> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("token", ADMIN_TOKEN)
            .append_pair("login", login)
            .append_pair("pswd", password)
            .finish();
        self.send(Method::POST, &format!("/api/register?{query}"), None, Body::empty(), None)
            .await
    }

    pub async fn login(&self, login: &str, password: &str) -> Result<hyper::Response<Body>> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("login", login)
            .append_pair("pswd", password)
            .finish();
        self.send(
            Method::POST,
            "/api/auth",
            None,
            Body::from(form),
            Some("application/x-www-form-urlencoded".to_string()),
        )
        .await
    }

    /// Registers `login` and returns a fresh session token for it.
    pub async fn signup(&self, login: &str, password: &str) -> Result<String> {
        let response = self.register(login, password).await?;
        ensure!(
            response.status() == StatusCode::OK,
            "register failed with status {}",
            response.status()
        );
        self.login_token(login, password).await
    }

    pub async fn login_token(&self, login: &str, password: &str) -> Result<String> {
        let response = self.login(login, password).await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(Deserialize)]
        struct LoginEnvelope {
            response: LoginBody,
        }
        #[derive(Deserialize)]
        struct LoginBody {
            token: String,
        }
        let body = body_to_vec(response.into_body()).await?;
        let parsed: LoginEnvelope = serde_json::from_slice(&body)?;
        Ok(parsed.response.token)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, token, Body::empty(), None).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, token, Body::empty(), None)
            .await
    }

    #[allow(dead_code)]
    pub async fn upload(&self, parts: &[Part<'_>], token: &str) -> Result<hyper::Response<Body>> {
        self.upload_parts(parts, Some(token)).await
    }

    /// Multipart upload; `None` sends no `Authorization` header.
    #[allow(dead_code)]
    pub async fn upload_parts(
        &self,
        parts: &[Part<'_>],
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File(name, filename, data) => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
                    body.extend(*data);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        self.send(
            Method::POST,
            "/api/docs",
            token,
            Body::from(body),
            Some(format!("multipart/form-data; boundary={boundary}")),
        )
        .await
    }

    /// Uploads a file document and returns its id.
    #[allow(dead_code)]
    pub async fn upload_file(
        &self,
        token: &str,
        name: &str,
        public: bool,
        grant: &[&str],
        data: &[u8],
    ) -> Result<String> {
        let meta = serde_json::json!({
            "name": name,
            "file": true,
            "public": public,
            "grant": grant,
        })
        .to_string();
        let response = self
            .upload(&[Part::Text("meta", &meta), Part::File("file", name, data)], token)
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "upload failed with status {}",
            response.status()
        );
        let body = body_json(response.into_body()).await?;
        body["data"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("upload response has no id: {body}"))
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Body,
        content_type: Option<String>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(body: Body) -> Result<Value> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        db::run_migrations(&pool)?;
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        truncate_all(&mut conn)
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE document_grants, documents, sessions, users CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}
