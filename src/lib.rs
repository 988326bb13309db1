pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use crate::{
    config::AppConfig,
    services::{
        bucket_migrator::BucketMigrator, object_store::ObjectStore,
        proof_resolver::ProofResolver, registrations::SqliteRegistrations,
        storage_service::LocalObjectStore,
    },
};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Request-independent settings the handlers need.
#[derive(Clone, Debug)]
pub struct Settings {
    pub canonical_bucket: String,
    pub legacy_bucket: String,
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub storage: Arc<LocalObjectStore>,
    pub resolver: Arc<ProofResolver>,
    pub migrator: Arc<BucketMigrator>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the bundled SQLite/disk backends into the resolver and migrator.
    pub fn from_config(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        let storage = Arc::new(LocalObjectStore::new(
            db.clone(),
            cfg.storage_dir.clone(),
            cfg.public_base_url.clone(),
        ));
        let store: Arc<dyn ObjectStore> = storage.clone();
        let registrations = Arc::new(SqliteRegistrations::new(db.clone()));

        let resolver = Arc::new(ProofResolver::new(
            store.clone(),
            cfg.canonical_bucket.clone(),
            cfg.fallback_buckets.clone(),
        ));
        let migrator = Arc::new(BucketMigrator::new(
            store,
            registrations,
            cfg.legacy_subfolders.clone(),
        ));

        Self {
            db,
            storage,
            resolver,
            migrator,
            settings: Arc::new(Settings {
                canonical_bucket: cfg.canonical_bucket.clone(),
                legacy_bucket: cfg.legacy_bucket.clone(),
                admin_token: cfg.admin_token.clone(),
            }),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
