pub mod provision;
pub mod proxy;
pub mod swagger;

use axum::Json;
use axum::http::StatusCode;
use serde_json::Value;
use veil_core::ProxyError;

/// Map a pipeline error to `(status, wrapped body)`. The body shape matches
/// the permuted response contract, so even error payloads sit under `result`.
pub fn error_response(err: &ProxyError, support_email: &str) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_wrapped_body(support_email)))
}
