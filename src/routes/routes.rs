//! Route table.
//!
//! ## Structure
//! - **Functions** (JSON in, JSON out)
//!   - `POST   /functions/resolve-proof`: newest proof/receipt URL for an application
//!   - `POST   /functions/migrate-receipts`: superadmin-only legacy bucket migration
//!
//! - **Storage**
//!   - `GET    /storage/public/{bucket}/{*key}`: public download (resolved URLs land here)
//!   - `GET    /storage/buckets/{bucket}`: list a folder (prefix, limit, offset, search)
//!   - `PUT    /storage/buckets/{bucket}`: create bucket
//!   - `PUT    /storage/buckets/{bucket}/objects/{*key}`: upload object
//!   - `GET    /storage/buckets/{bucket}/objects/{*key}`: download object
//!   - `DELETE /storage/buckets/{bucket}/objects/{*key}`: delete object
//!
//! Every route answers CORS preflight requests.

use crate::{
    AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        proof_handlers::{migrate_receipts, resolve_proof},
        storage_handlers::{
            create_bucket, delete_object, get_object, get_public_object, list_objects,
            upload_object,
        },
    },
};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the router for every endpoint; state is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/functions/resolve-proof", post(resolve_proof))
        .route("/functions/migrate-receipts", post(migrate_receipts))
        .route("/storage/public/{bucket}/{*key}", get(get_public_object))
        .route(
            "/storage/buckets/{bucket}",
            get(list_objects).put(create_bucket),
        )
        .route(
            "/storage/buckets/{bucket}/objects/{*key}",
            get(get_object).put(upload_object).delete(delete_object),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
