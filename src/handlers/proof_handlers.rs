//! JSON endpoints for proof resolution and receipt migration.

use crate::{
    AppState,
    errors::AppError,
    handlers::optional_json,
    handlers::auth::AdminCaller,
    models::migration::MigrationReport,
    services::{naming::ProofKind, proof_resolver::ResolveOptions},
};
use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub kind: ProofKind,
    #[serde(flatten)]
    pub options: ResolveOptions,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateRequest {
    pub legacy_bucket: Option<String>,
    pub canonical_bucket: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MigrateResponse {
    pub report: MigrationReport,
}

/// `POST /functions/resolve-proof`
///
/// Always 200 for a well-formed request; "nothing found" and "storage
/// unreachable" both come back as `{ "url": null }`.
pub async fn resolve_proof(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let application_id = req.application_id.trim();
    if application_id.is_empty() {
        return Err(AppError::bad_request("applicationId is required"));
    }
    if let Some(bucket) = req.options.bucket.as_deref() {
        state.storage.ensure_bucket_name_safe(bucket)?;
    }

    let url = state
        .resolver
        .resolve(application_id, req.kind, &req.options)
        .await;
    tracing::info!(application_id, found = url.is_some(), "proof resolved");
    Ok(Json(ResolveResponse { url }))
}

/// `POST /functions/migrate-receipts`
///
/// The body is optional; missing buckets fall back to the configured ones.
pub async fn migrate_receipts(
    State(state): State<AppState>,
    AdminCaller(caller): AdminCaller,
    body: Bytes,
) -> Result<Json<MigrateResponse>, AppError> {
    let req: MigrateRequest = optional_json(&body)?;

    let legacy = req
        .legacy_bucket
        .unwrap_or_else(|| state.settings.legacy_bucket.clone());
    let canonical = req
        .canonical_bucket
        .unwrap_or_else(|| state.settings.canonical_bucket.clone());
    state.storage.ensure_bucket_name_safe(&legacy)?;
    state.storage.ensure_bucket_name_safe(&canonical)?;

    let report = state.migrator.migrate(&caller, &legacy, &canonical).await?;
    Ok(Json(MigrateResponse { report }))
}
