//! HTTP handlers for the bundled object store.
//! Object bodies are streamed in both directions; storage concerns stay in
//! `LocalObjectStore`.

use crate::{
    AppState,
    errors::AppError,
    handlers::optional_json,
    models::object::Object,
    services::object_store::{ListOptions, UploadOptions},
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;

const UPSERT_HEADER: HeaderName = HeaderName::from_static("x-upsert");

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: String,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListedEntry {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size: i64,
    pub content_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateBucketReq {
    #[serde(default)]
    pub public: bool,
}

/// `PUT /storage/buckets/{bucket}/objects/{*key}`
///
/// Overwrites only when `x-upsert: true` is sent; otherwise an existing key
/// yields 409.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let upsert = headers
        .get(&UPSERT_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = state
        .storage
        .upload_object_stream(
            &bucket,
            &key,
            UploadOptions {
                upsert,
                content_type,
            },
            stream,
        )
        .await?;

    let mut resp_headers = HeaderMap::new();
    if let Some(etag) = object.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            resp_headers.insert(header::ETAG, value);
        }
    }
    let url = state.storage.public_url_for(&bucket, &key);
    Ok((
        StatusCode::OK,
        resp_headers,
        Json(serde_json::json!({ "key": object.key, "publicUrl": url })),
    ))
}

/// `GET /storage/public/{bucket}/{*key}`: the target of resolved URLs.
pub async fn get_public_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_public_object_reader(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `GET /storage/buckets/{bucket}/objects/{*key}`: authenticated download.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, file) = state.storage.get_object_reader(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `DELETE /storage/buckets/{bucket}/objects/{*key}`
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.storage.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /storage/buckets/{bucket}?prefix=&limit=&offset=&search=`
pub async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ListedEntry>>, AppError> {
    let options = ListOptions {
        limit: q.limit.unwrap_or(100),
        offset: q.offset,
        search: q.search,
    };
    let folder_len = q.prefix.trim_matches('/').len();
    let rows = state
        .storage
        .list_folder(&bucket, &q.prefix, &options)
        .await?;

    let entries = rows
        .into_iter()
        .map(|obj| {
            let skip = if folder_len == 0 { 0 } else { folder_len + 1 };
            ListedEntry {
                name: obj.key[skip..].to_string(),
                created_at: obj.created_at,
                updated_at: obj.updated_at,
                size: obj.size_bytes,
                content_type: obj.content_type,
            }
        })
        .collect();
    Ok(Json(entries))
}

/// `PUT /storage/buckets/{bucket}`: create bucket, body `{ "public": bool }`.
pub async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let req: CreateBucketReq = optional_json(&body)?;
    let public = req.public;
    let created = state.storage.create_bucket(&bucket, public).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.updated_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
