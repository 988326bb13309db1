use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Origin used when building public object URLs.
    pub public_base_url: String,
    /// Bucket that proofs and migrated receipts live in.
    pub canonical_bucket: String,
    /// Bucket receipts are migrated out of.
    pub legacy_bucket: String,
    /// Extra buckets the resolver searches after the canonical one.
    pub fallback_buckets: Vec<String>,
    /// Folders inside the legacy bucket swept in addition to its root.
    pub legacy_subfolders: Vec<String>,
    /// Shared secret the upstream gateway forwards for superadmin calls.
    pub admin_token: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Payment proof resolver and receipt migrator")]
pub struct Args {
    /// Host to bind to (overrides PROOF_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PROOF_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides PROOF_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PROOF_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public origin for object URLs (overrides PROOF_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Canonical proof bucket (overrides PROOF_CANONICAL_BUCKET)
    #[arg(long)]
    pub canonical_bucket: Option<String>,

    /// Legacy receipt bucket (overrides PROOF_LEGACY_BUCKET)
    #[arg(long)]
    pub legacy_bucket: Option<String>,

    /// Comma-separated fallback buckets (overrides PROOF_FALLBACK_BUCKETS)
    #[arg(long)]
    pub fallback_buckets: Option<String>,

    /// Comma-separated legacy subfolders (overrides PROOF_LEGACY_SUBFOLDERS)
    #[arg(long)]
    pub legacy_subfolders: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        let env_host = env_or("PROOF_HOST", "0.0.0.0");
        let env_port = match env::var("PROOF_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PROOF_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading PROOF_PORT"),
        };
        let port = args.port.unwrap_or(env_port);
        let host = args.host.unwrap_or(env_host);

        let public_base_url = args
            .public_base_url
            .or_else(|| env::var("PROOF_PUBLIC_BASE_URL").ok())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));

        let canonical_bucket = args
            .canonical_bucket
            .unwrap_or_else(|| env_or("PROOF_CANONICAL_BUCKET", "payment-proofs"));
        let legacy_bucket = args
            .legacy_bucket
            .unwrap_or_else(|| env_or("PROOF_LEGACY_BUCKET", "receipts"));

        let fallback_buckets = split_list(
            &args
                .fallback_buckets
                .unwrap_or_else(|| env_or("PROOF_FALLBACK_BUCKETS", &legacy_bucket)),
        );
        let legacy_subfolders = split_list(
            &args
                .legacy_subfolders
                .unwrap_or_else(|| env_or("PROOF_LEGACY_SUBFOLDERS", "receipts")),
        );

        let admin_token = env::var("PROOF_ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        Ok(Self {
            host,
            port,
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("PROOF_STORAGE_DIR", "./data/objects")),
            database_url: args
                .database_url
                .unwrap_or_else(|| env_or("PROOF_DATABASE_URL", "sqlite://./data/meta/proofs.db")),
            public_base_url,
            canonical_bucket,
            legacy_bucket,
            fallback_buckets,
            legacy_subfolders,
            admin_token,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
