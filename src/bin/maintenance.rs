use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use docshare::auth::CredentialService;
use docshare::config::AppConfig;
use docshare::db;
use docshare::repo::PgStore;

const USAGE: &str = "Usage:\n  maintenance migrate\n  maintenance create-user <login> <password>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate().await?,
        Some("create-user") => {
            let (Some(login), Some(password)) = (args.next(), args.next()) else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            create_user(&login, &password).await?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_pool() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded configuration"
    );
    db::init_pool_with_size(&config.database_url, config.database_max_pool_size)
}

async fn migrate() -> Result<()> {
    let pool = load_pool()?;
    let applied = tokio::task::spawn_blocking(move || db::run_migrations(&pool))
        .await
        .context("migration task panicked")??;
    println!("Applied {applied} migration(s).");
    Ok(())
}

/// Creates an account directly, skipping the admin token and the
/// login/password rules that the HTTP registration applies.
async fn create_user(login: &str, password: &str) -> Result<()> {
    if login.trim().is_empty() || password.is_empty() {
        bail!("login and password must not be empty");
    }
    let pool = load_pool()?;
    let credentials = CredentialService::new(Arc::new(PgStore::new(pool)), String::new());
    let id = credentials
        .create_user(login, password)
        .await
        .with_context(|| format!("failed to create user {login}"))?;
    println!("Created user {login} ({id}).");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
