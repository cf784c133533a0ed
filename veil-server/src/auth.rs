use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use veil_core::{ProxyError, UserRecord};
use veil_store::UserStore;

/// Authenticate a request via `Authorization: Basic <base64>` against the
/// local user store. The email is the username; the password is checked
/// against the stored bcrypt hash.
pub fn authenticate(headers: &HeaderMap, users: &UserStore) -> Result<UserRecord, ProxyError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ProxyError::NotAuthenticated("Missing authorization header".into()))?;

    let encoded = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))
        .ok_or_else(|| ProxyError::NotAuthenticated("Invalid authorization scheme".into()))?;

    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|_| ProxyError::NotAuthenticated("Invalid base64 encoding".into()))?;
    let credentials = String::from_utf8(decoded)
        .map_err(|_| ProxyError::NotAuthenticated("Invalid credentials encoding".into()))?;

    let (email, password) = credentials
        .split_once(':')
        .ok_or_else(|| ProxyError::NotAuthenticated("Malformed credentials".into()))?;

    let user = users
        .find_by_email(email)
        .ok_or_else(|| ProxyError::NotAuthenticated("Unknown user".into()))?;
    if !UserStore::verify_password(&user, password) {
        return Err(ProxyError::NotAuthenticated("Bad credentials".into()));
    }

    Ok(user)
}
