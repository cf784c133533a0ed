use crate::handlers::error_response;
use crate::routes::AppState;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use veil_core::ProxyError;
use veil_proxy::pipeline::ProxyResponse;
use veil_proxy::request::ObservedRequest;

/// Upper bound on buffered request bodies. The proxied API ships small JSON
/// payloads; streaming uploads are out of scope.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// `ANY /{version}/{*rest}` — the proxy entry point. The version segment
/// carries the user pk selecting mixer and seed.
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    let support_email = state.config.support_email.clone();
    match handle(state, request).await {
        Ok(response) => render(response),
        Err(err) => {
            tracing::debug!(error = %err, "Proxy request failed");
            error_response(&err, &support_email).into_response()
        }
    }
}

fn render(response: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}

async fn handle(state: AppState, request: Request) -> Result<ProxyResponse, ProxyError> {
    let (parts, body) = request.into_parts();

    let path = parts.uri.path().to_string();
    let user_pk = parse_user_pk(&path)?;

    let mut observed = ObservedRequest::new(parts.method.as_str(), &path);

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            observed
                .headers
                .push((name.as_str().to_lowercase(), value.to_string()));
        }
    }

    if let Some(query) = parts.uri.query() {
        observed.query = serde_urlencoded::from_str(query)
            .map_err(|e| ProxyError::BadBody(format!("undecodable query string: {e}")))?;
    }

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::BadBody(format!("unreadable body: {e}")))?;
    if !bytes.is_empty() {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/json") {
            observed.body = Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| ProxyError::BadBody(format!("invalid JSON body: {e}")))?,
            );
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            observed.form = serde_urlencoded::from_bytes(&bytes)
                .map_err(|e| ProxyError::BadBody(format!("undecodable form body: {e}")))?;
        } else {
            tracing::debug!(content_type = %content_type, "Ignoring body with unhandled content type");
        }
    }

    state.pipeline.handle(user_pk, observed).await
}

/// `/v7/people/42` → `7`. Anything else is not a proxy path.
fn parse_user_pk(path: &str) -> Result<i64, ProxyError> {
    let segment = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    segment
        .strip_prefix('v')
        .and_then(|digits| {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                digits.parse().ok()
            }
        })
        .ok_or(ProxyError::UserNotFound(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_pk_from_version_segment() {
        assert_eq!(parse_user_pk("/v7/people/42").unwrap(), 7);
        assert_eq!(parse_user_pk("/v123/login").unwrap(), 123);
    }

    #[test]
    fn rejects_paths_without_a_version_segment() {
        assert!(parse_user_pk("/people/42").is_err());
        assert!(parse_user_pk("/version/42").is_err());
        assert!(parse_user_pk("/v/42").is_err());
        assert!(parse_user_pk("/vabc/42").is_err());
    }
}
