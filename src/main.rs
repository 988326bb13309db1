use anyhow::Result;
use proof_reconciler::{AppState, config::AppConfig, create_app, db};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        canonical_bucket = %cfg.canonical_bucket,
        legacy_bucket = %cfg.legacy_bucket,
        fallback_buckets = ?cfg.fallback_buckets,
        admin_endpoints = cfg.admin_token.is_some(),
        "Starting proof-reconciler"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Schema (the statements are idempotent, so always safe to run) ---
    db::apply_schema(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize services ---
    let state = AppState::from_config(db, &cfg);
    state
        .storage
        .ensure_bucket(&cfg.canonical_bucket, true)
        .await?;
    state.storage.ensure_bucket(&cfg.legacy_bucket, true).await?;

    let app = create_app(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
