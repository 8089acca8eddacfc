use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
/// One year. Keeps `now + ttl` far from the timestamp range limits.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub admin_token: String,
    pub session_ttl_hours: i64,
    pub blob_storage_root: PathBuf,
    pub cache_ttl_seconds: u64,
    pub run_migrations: bool,
    pub cors_allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let admin_token = env::var("ADMIN_TOKEN").context("ADMIN_TOKEN must be set")?;
        let session_ttl_hours = match env::var("SESSION_TTL_HOURS") {
            Ok(raw) => parse_session_ttl_hours(&raw)?,
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };
        let blob_storage_root = env::var("BLOB_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./file-storage"));
        let cache_ttl_seconds = env::var("CACHE_TTL_SECONDS")
            .unwrap_or_else(|_| DEFAULT_CACHE_TTL_SECONDS.to_string())
            .parse()
            .context("CACHE_TTL_SECONDS must be an integer")?;
        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            admin_token,
            session_ttl_hours,
            blob_storage_root,
            cache_ttl_seconds,
            run_migrations,
            cors_allowed_origin,
            max_upload_bytes,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn parse_session_ttl_hours(raw: &str) -> Result<i64> {
    let hours: i64 = raw
        .trim()
        .parse()
        .context("SESSION_TTL_HOURS must be an integer")?;
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        bail!("SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}, got {hours}");
    }
    Ok(hours)
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
