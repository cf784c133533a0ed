use serde::{Deserialize, Serialize};

/// A locally provisioned proxy user. The user's primary key doubles as the
/// permutation seed for their mixer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,

    pub email: String,

    /// bcrypt hash of the user's password
    pub password_hash: String,

    /// Per-user `App-Token` the client must present
    pub app_token: String,

    /// Per-user `Auth-Token` handed out by the local auth shadow
    pub auth_token: String,

    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The upstream `/users` record matching a local user, fetched once at mixer
/// construction. Drives the personal response filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamUser {
    pub id: i64,

    pub email: String,

    #[serde(default)]
    pub organizations: Vec<NamedRef>,

    #[serde(default)]
    pub projects: Vec<NamedRef>,
}

/// An `{id, name}` membership reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}
