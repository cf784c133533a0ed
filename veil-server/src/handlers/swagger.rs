use crate::auth;
use crate::handlers::error_response;
use crate::routes::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use veil_core::ProxyError;

/// `GET /swagger.json` — the caller's permuted document, with `host` set to
/// the incoming request's Host header.
pub async fn swagger_json(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match serve(&state, &headers).await {
        Ok(doc) => Json(doc).into_response(),
        Err(err @ ProxyError::NotAuthenticated(_)) => {
            let (status, body) = error_response(&err, &state.config.support_email);
            (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"Veil\"")],
                body,
            )
                .into_response()
        }
        Err(err) => error_response(&err, &state.config.support_email).into_response(),
    }
}

async fn serve(state: &AppState, headers: &HeaderMap) -> Result<Value, ProxyError> {
    let user = auth::authenticate(headers, &state.users)?;

    let mixer = state.pipeline.mixer_for(user).await?;
    let mut doc = mixer.permuted_swagger().clone();

    let host = match headers.get(header::HOST).and_then(|value| value.to_str().ok()) {
        Some(host) => host.to_string(),
        None => state.config.listen_addr.to_string(),
    };
    doc.set_host(&host);

    Ok(doc.into_value())
}
