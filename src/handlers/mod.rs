pub mod auth;
pub mod health_handlers;
pub mod proof_handlers;
pub mod storage_handlers;

use crate::errors::AppError;
use serde::de::DeserializeOwned;

/// Decode an optional JSON body; an empty body yields `T::default()`.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| AppError::bad_request(format!("malformed request body: {}", err)))
}
