//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity, disk I/O and
//!   that the canonical proof bucket is registered

use crate::{AppState, services::object_store::ListOptions};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`: never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against SQLite, a write/read/delete round against the
/// payload directory and a one-row listing of the canonical bucket.
/// 200 when all pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };
    let disk = check_disk(&state.storage.base_path).await;

    let probe = ListOptions {
        limit: 1,
        ..ListOptions::default()
    };
    let bucket = match state
        .storage
        .list_folder(&state.settings.canonical_bucket, "", &probe)
        .await
    {
        Ok(_) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(e.to_string()),
    };

    let overall_ok = sqlite.ok && disk.ok && bucket.ok;
    let checks = HashMap::from([
        ("sqlite", sqlite),
        ("disk", disk),
        ("canonical_bucket", bucket),
    ]);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_disk(base_path: &Path) -> CheckStatus {
    let tmp_path = base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::failed(format!("could not write tmp file: {}", e));
    }
    let read = fs::read(&tmp_path).await;
    let removed = fs::remove_file(&tmp_path).await;
    match (read, removed) {
        (Ok(bytes), Ok(())) if bytes == b"readyz" => CheckStatus::ok(),
        (Ok(bytes), Err(e)) if bytes == b"readyz" => CheckStatus {
            ok: true,
            error: Some(format!("could not remove tmp file: {}", e)),
        },
        (Ok(_), _) => CheckStatus::failed("file content mismatch"),
        (Err(e), _) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(msg.into()),
        }
    }
}
