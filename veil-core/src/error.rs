use thiserror::Error;

/// Unified error type for the Veil proxy.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Proxy is currently unavailable, please try again later")]
    GloballyThrottled,

    #[error(
        "Too many attempts to access the upstream API with wrong credentials; \
         please wait 24h before further attempts"
    )]
    UserThrottled,

    #[error(
        "Unexpected parameter: method=\"{method}\" path=\"{path}\" \
         location=\"{location}\" name=\"{name}\" value=\"{value}\""
    )]
    UnexpectedParameter {
        method: String,
        path: String,
        location: String,
        name: String,
        value: String,
    },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Bad request body: {0}")]
    BadBody(String),

    #[error("{0}")]
    BadCredentials(String),

    #[error("No payload provided (no headers or parameters)")]
    NoPayload,

    #[error("{0}")]
    Unsupported(String),

    #[error("User with email {0} not found in upstream /users response")]
    UserNotInUpstream(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Out of synonyms for \"{0}\"")]
    OutOfSynonyms(String),

    #[error("Invalid Swagger document: {0}")]
    Swagger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::NotAuthenticated(_) => 401,
            ProxyError::UserNotFound(_) => 404,
            ProxyError::GloballyThrottled => 403,
            ProxyError::UserThrottled => 403,
            ProxyError::UnexpectedParameter { .. } => 400,
            ProxyError::UnknownParameter(_) => 400,
            ProxyError::BadBody(_) => 400,
            ProxyError::BadCredentials(_) => 400,
            ProxyError::NoPayload => 400,
            ProxyError::Unsupported(_) => 400,
            ProxyError::UserNotInUpstream(_) => 400,
            ProxyError::Upstream(_) => 500,
            _ => 500,
        }
    }

    /// Error body in the permuted response shape: the payload sits under
    /// `result`, matching what the result-wrapper processor emits for
    /// successful responses.
    pub fn to_wrapped_body(&self, support_email: &str) -> serde_json::Value {
        serde_json::json!({
            "result": {
                "error": self.to_string(),
                "help": format!(
                    "Please contact {support_email} if you think the API is \
                     misbehaving or you have any questions"
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ProxyError::NotAuthenticated("x".into()).status_code(), 401);
        assert_eq!(ProxyError::UserNotFound(7).status_code(), 404);
        assert_eq!(ProxyError::GloballyThrottled.status_code(), 403);
        assert_eq!(ProxyError::UserThrottled.status_code(), 403);
        assert_eq!(ProxyError::BadBody("x".into()).status_code(), 400);
        assert_eq!(ProxyError::NoPayload.status_code(), 400);
        assert_eq!(ProxyError::Upstream("x".into()).status_code(), 500);
        assert_eq!(ProxyError::OutOfSynonyms("users".into()).status_code(), 500);
        assert_eq!(ProxyError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_wrapped_body_shape() {
        let err = ProxyError::BadBody("not an object".into());
        let body = err.to_wrapped_body("support@veil.dev");
        assert!(body["result"]["error"].as_str().unwrap().contains("not an object"));
        assert!(body["result"]["help"].as_str().unwrap().contains("support@veil.dev"));
    }

    #[test]
    fn test_unexpected_parameter_message() {
        let err = ProxyError::UnexpectedParameter {
            method: "GET".into(),
            path: "/v1/people".into(),
            location: "QUERY".into(),
            name: "foo".into(),
            value: "bar".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("method=\"GET\""));
        assert!(msg.contains("name=\"foo\""));
        assert!(msg.contains("value=\"bar\""));
    }
}
