use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use veil_core::config::UpstreamConfig;
use veil_core::user::UpstreamUser;
use veil_core::ProxyError;
use veil_engine::request::UpstreamRequest;

/// A decoded upstream response: the status code plus the body parsed as JSON
/// when possible, passed through as text otherwise.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

/// The upstream API surface the pipeline depends on. The production
/// implementation is [`UpstreamClient`]; tests substitute stubs.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Dispatch an assembled canonical request.
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, ProxyError>;

    /// Page through `GET /v1/users` until the record for `email` turns up.
    async fn fetch_user(&self, email: &str) -> Result<UpstreamUser, ProxyError>;
}

/// Shared upstream HTTP client: one connection pool, the process-wide
/// credentials, and fixed timeouts. Built once from config at startup and
/// handed to the pipeline — no ambient singletons.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    app_token: String,
    auth_token: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_token: config.app_token.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Build the client and, when no `Auth-Token` is configured, obtain one
    /// through the canonical auth endpoint using the service account.
    pub async fn connect(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let mut client = Self::new(config)?;
        if client.auth_token.is_empty() {
            if config.username.is_empty() {
                tracing::warn!("No upstream Auth-Token or service account configured");
                return Ok(client);
            }
            client.auth_token = client.exchange_credentials(config).await?;
            tracing::info!("Obtained upstream auth token via service account");
        }
        Ok(client)
    }

    async fn exchange_credentials(&self, config: &UpstreamConfig) -> Result<String, ProxyError> {
        let response = self
            .http
            .post(format!("{}/v1/auth", self.base_url))
            .header("App-Token", &self.app_token)
            .form(&[
                ("email", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProxyError::Upstream(format!(
                "upstream auth returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        body.get("user")
            .and_then(|user| user.get("auth_token"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProxyError::Upstream("auth response carried no token".into()))
    }
}

#[async_trait]
impl UpstreamApi for UpstreamClient {
    async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| ProxyError::Internal(format!("bad method {}", request.method)))?;

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        } else if !request.body.is_empty() {
            builder = builder.json(&request.body);
        }

        tracing::info!(method = %request.method, url = %request.url, "Dispatching upstream");
        let response = builder
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(UpstreamResponse { status, body })
    }

    async fn fetch_user(&self, email: &str) -> Result<UpstreamUser, ProxyError> {
        let url = format!("{}/v1/users", self.base_url);
        let mut offset: usize = 0;

        loop {
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("organization_memberships", "true"),
                    ("project_memberships", "true"),
                    ("offset", offset.to_string().as_str()),
                ])
                .header("App-Token", &self.app_token)
                .header("Auth-Token", &self.auth_token)
                .send()
                .await
                .map_err(|e| ProxyError::Upstream(e.to_string()))?;

            if !response.status().is_success() {
                return Err(ProxyError::Upstream(format!(
                    "upstream /users returned {}",
                    response.status()
                )));
            }

            let page: Value = response
                .json()
                .await
                .map_err(|e| ProxyError::Upstream(e.to_string()))?;
            let users = page
                .get("users")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if users.is_empty() {
                return Err(ProxyError::UserNotInUpstream(email.to_string()));
            }

            for user in &users {
                if user.get("email").and_then(Value::as_str) == Some(email) {
                    return serde_json::from_value(user.clone()).map_err(|e| {
                        ProxyError::Upstream(format!("malformed upstream user record: {e}"))
                    });
                }
            }

            offset += users.len();
            tracing::debug!(offset = offset, email = %email, "Paging upstream /users");
        }
    }
}
