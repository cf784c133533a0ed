use crate::routes::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use serde_json::{Value, json};

/// `POST /api/user-update` — API-key gated provisioning: create-or-update a
/// user by email, reset the password, return the new password.
pub async fn user_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let email = match extract_email(&headers, &body) {
        Some(email) if !email.is_empty() => email,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing email"})),
            );
        }
    };

    let Some(api_key) = &state.config.api_key else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "API key not set"})),
        );
    };

    let supplied = headers
        .get("ApiKey")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if supplied != api_key {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "Bad API key"})));
    }

    match state.users.create_or_update(&email) {
        Ok((user, password)) => {
            tracing::info!(user_id = user.id, email = %user.email, "Provisioned user");
            (
                StatusCode::OK,
                Json(json!({
                    "message": format!("Updated {email}"),
                    "password": password,
                })),
            )
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": err.to_string()})),
        ),
    }
}

/// The email arrives as a form field or a JSON body key.
fn extract_email(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/json") {
        let parsed: Value = serde_json::from_slice(body).ok()?;
        return parsed
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    fields
        .into_iter()
        .find(|(name, _)| name == "email")
        .map(|(_, value)| value)
}
