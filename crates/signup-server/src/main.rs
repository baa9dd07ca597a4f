use anyhow::Context;
use tracing::info;

use signup_auth::CredentialStore;
use signup_db::Database;
use signup_types::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signup=debug,signup_db=info,signup_auth=info".into()),
        )
        .init();

    // Config: refuses to start without DATABASE_URL
    let config = Config::from_env().context("invalid configuration")?;
    info!(
        mode = ?config.mode,
        pool_size = config.pool_size,
        hash_cost = config.hash_cost,
        "Configuration loaded"
    );

    // Init database
    let db = Database::from_config(&config).context("unable to open database")?;
    db.create_schema().await.context("unable to create schema")?;

    let store = CredentialStore::from_config(db.clone(), &config);
    let users = store.find_all().await.context("unable to read users")?.len();
    let events = db.list_events().await.context("unable to read events")?.len();

    info!(users, events, "Signup data layer ready; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down, draining database connections");
    db.close().await;

    Ok(())
}
