use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration for the Veil proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeilConfig {
    /// HTTP listener address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Path to the canonical Swagger 2.0 document
    #[serde(default = "default_swagger_file")]
    pub swagger_file: PathBuf,

    /// Directory holding persisted state (users.json, failures.json)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Email address surfaced in error responses
    #[serde(default = "default_support_email")]
    pub support_email: String,

    /// API key gating `POST /api/user-update`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upstream API configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Abuse/lockout thresholds
    #[serde(default)]
    pub abuse: AbuseConfig,

    /// Permutation engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the canonical upstream API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Process-wide upstream `App-Token` credential
    #[serde(default)]
    pub app_token: String,

    /// Process-wide upstream `Auth-Token` credential. May be left empty when
    /// `username`/`password` are set; the client then obtains one from the
    /// canonical auth endpoint at startup.
    #[serde(default)]
    pub auth_token: String,

    /// Service account email for the startup token exchange
    #[serde(default)]
    pub username: String,

    /// Service account password for the startup token exchange
    #[serde(default)]
    pub password: String,

    /// Upstream connect timeout (seconds)
    #[serde(default = "default_upstream_timeout")]
    pub connect_timeout_secs: u64,

    /// Upstream read timeout (seconds)
    #[serde(default = "default_upstream_timeout")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseConfig {
    /// Per-user failed-authentication threshold; a user exceeding it within
    /// 24h is blocked
    #[serde(default = "default_max_failed")]
    pub max_failed_before_block: u32,

    /// Total failed authentications within 24h after which all proxying stops
    #[serde(default = "default_global_threshold")]
    pub global_failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Re-label HTTP methods per path. Off by default: method permutation
    /// conflicts with path-template semantics.
    #[serde(default)]
    pub permute_methods: bool,
}

impl VeilConfig {
    /// Load configuration from YAML file + environment variables.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        } else {
            // Try default locations
            for default_path in &["veil.yaml", "/etc/veil/veil.yaml", "config/veil.yaml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Yaml::file(default_path));
                    break;
                }
            }
        }

        // Environment variables override: VEIL_UPSTREAM__APP_TOKEN, etc.
        figment = figment.merge(Env::prefixed("VEIL_").split("__"));

        let config: Self = figment.extract()?;
        Ok(config)
    }

    /// Path of the persisted user store.
    pub fn users_file(&self) -> PathBuf {
        self.state_dir.join("users.json")
    }

    /// Path of the persisted abuse log.
    pub fn failures_file(&self) -> PathBuf {
        self.state_dir.join("failures.json")
    }
}

impl UpstreamConfig {
    /// The canonical authentication endpoint. Requests reversed onto this URL
    /// are answered locally and never forwarded upstream.
    pub fn auth_url(&self) -> String {
        format!("{}/v1/auth", self.base_url.trim_end_matches('/'))
    }
}

// Default implementations

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            swagger_file: default_swagger_file(),
            state_dir: default_state_dir(),
            support_email: default_support_email(),
            api_key: None,
            upstream: UpstreamConfig::default(),
            abuse: AbuseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_token: String::new(),
            auth_token: String::new(),
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: default_upstream_timeout(),
            read_timeout_secs: default_upstream_timeout(),
        }
    }
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            max_failed_before_block: default_max_failed(),
            global_failure_threshold: default_global_threshold(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            permute_methods: false,
        }
    }
}

// Serde default functions

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:9080".parse().expect("static address")
}

fn default_swagger_file() -> PathBuf {
    PathBuf::from("data/upstream.v1.swagger.json")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_support_email() -> String {
    "support@example.com".to_string()
}

fn default_base_url() -> String {
    "https://api.hubstaff.com".to_string()
}

fn default_upstream_timeout() -> u64 {
    60
}

fn default_max_failed() -> u32 {
    3
}

fn default_global_threshold() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = VeilConfig::default();
        assert_eq!(cfg.listen_addr.port(), 9080);
        assert_eq!(cfg.upstream.connect_timeout_secs, 60);
        assert_eq!(cfg.abuse.global_failure_threshold, 10);
        assert!(!cfg.engine.permute_methods);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn test_auth_url_strips_trailing_slash() {
        let mut up = UpstreamConfig::default();
        up.base_url = "https://api.hubstaff.com/".into();
        assert_eq!(up.auth_url(), "https://api.hubstaff.com/v1/auth");
    }

    #[test]
    fn test_state_file_paths() {
        let cfg = VeilConfig::default();
        assert!(cfg.users_file().ends_with("users.json"));
        assert!(cfg.failures_file().ends_with("failures.json"));
    }

    #[test]
    fn test_yaml_overrides() {
        let figment = Figment::new().merge(figment::providers::Yaml::string(
            r#"
            listen_addr: 127.0.0.1:8099
            support_email: ops@veil.dev
            abuse:
              max_failed_before_block: 5
            engine:
              permute_methods: true
            "#,
        ));
        let cfg: VeilConfig = figment.extract().unwrap();
        assert_eq!(cfg.listen_addr.port(), 8099);
        assert_eq!(cfg.support_email, "ops@veil.dev");
        assert_eq!(cfg.abuse.max_failed_before_block, 5);
        assert!(cfg.engine.permute_methods);
    }
}
