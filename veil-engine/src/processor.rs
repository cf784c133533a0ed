//! Request/result processor chains.
//!
//! A mixer carries two ordered lists of processors, configured at build time
//! and immutable thereafter: request processors run on the assembled
//! canonical request just before dispatch; result processors run on the
//! decoded upstream payload just before serialization. Error payloads pass
//! through the result chain's final wrapper too, so error shapes match the
//! permuted schema contract.

use crate::mixer::MixerMeta;
use crate::request::UpstreamRequest;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use veil_core::ProxyError;

pub trait RequestProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, request: &mut UpstreamRequest, meta: &MixerMeta) -> Result<(), ProxyError>;
}

pub trait ResultProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, result: Value, meta: &MixerMeta) -> Value;
}

/// Verifies the client-supplied `App-Token`/`Auth-Token` headers against the
/// user's stored credentials, then overwrites both with the process-wide
/// upstream credentials. Clients never learn the real tokens.
pub struct CredentialInjector {
    pub upstream_app_token: String,
    pub upstream_auth_token: String,
}

impl RequestProcessor for CredentialInjector {
    fn name(&self) -> &str {
        "credential-injector"
    }

    fn process(&self, request: &mut UpstreamRequest, meta: &MixerMeta) -> Result<(), ProxyError> {
        let app_token = request
            .get_header("app-token")
            .ok_or_else(|| ProxyError::BadCredentials("Missing app token".into()))?;
        if app_token != meta.user.app_token {
            return Err(ProxyError::BadCredentials("Wrong app token".into()));
        }
        request.set_header("App-Token", self.upstream_app_token.clone());

        let auth_token = request
            .get_header("auth-token")
            .ok_or_else(|| ProxyError::BadCredentials("Missing auth token".into()))?;
        if auth_token != meta.user.auth_token {
            return Err(ProxyError::BadCredentials("Wrong auth token".into()));
        }
        request.set_header("Auth-Token", self.upstream_auth_token.clone());

        Ok(())
    }
}

/// Redacts upstream payloads down to what the caller may see. For a top-level
/// mapping, each list value is filtered by the shape of its first element:
/// entries owned by another identity are dropped. Lists matching no known
/// shape pass through untouched with a debug log.
pub struct PersonalFilter;

impl ResultProcessor for PersonalFilter {
    fn name(&self) -> &str {
        "personal-filter"
    }

    fn process(&self, result: Value, meta: &MixerMeta) -> Value {
        let Value::Object(map) = result else {
            tracing::debug!("Personal filter skipped: payload is not a mapping");
            return result;
        };

        let email = meta.user.email.as_str();
        let user_id = meta.user_data.id;
        let organization_names: HashSet<&str> = meta
            .user_data
            .organizations
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        let project_names: HashSet<&str> = meta
            .user_data
            .projects
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        let project_ids: HashSet<i64> = meta.user_data.projects.iter().map(|p| p.id).collect();

        let mut filtered = Map::new();
        for (key, content) in map {
            let Value::Array(items) = content else {
                filtered.insert(key, content);
                continue;
            };
            if items.is_empty() {
                filtered.insert(key, Value::Array(items));
                continue;
            }

            let first = &items[0];
            let kept: Vec<Value> = if first.get("email").is_some() {
                retain(items, |item| item.get("email").and_then(Value::as_str) == Some(email))
            } else if first.get("user").and_then(|u| u.get("email")).is_some() {
                retain(items, |item| {
                    item.get("user")
                        .and_then(|u| u.get("email"))
                        .and_then(Value::as_str)
                        == Some(email)
                })
            } else if key == "organizations" {
                retain(items, |item| {
                    item.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| organization_names.contains(name))
                })
            } else if key == "projects" {
                retain(items, |item| {
                    item.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| project_names.contains(name))
                })
            } else if first.get("user_id").is_some() {
                retain(items, |item| {
                    item.get("user_id").and_then(Value::as_i64) == Some(user_id)
                })
            } else if first.get("project_id").is_some() {
                retain(items, |item| {
                    item.get("project_id")
                        .and_then(Value::as_i64)
                        .is_some_and(|id| project_ids.contains(&id))
                })
            } else {
                tracing::debug!(key = %key, "No personal filter applies to this list");
                items
            };
            filtered.insert(key, Value::Array(kept));
        }

        Value::Object(filtered)
    }
}

fn retain(items: Vec<Value>, keep: impl Fn(&Value) -> bool) -> Vec<Value> {
    items.into_iter().filter(|item| keep(item)).collect()
}

/// Wraps the final payload as `{result: <payload>}`, matching the schema
/// rewriting done by `permute_result`.
pub struct ResultWrapper;

impl ResultProcessor for ResultWrapper {
    fn name(&self) -> &str {
        "result-wrapper"
    }

    fn process(&self, result: Value, _meta: &MixerMeta) -> Value {
        json!({ "result": result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::user::{NamedRef, UpstreamUser, UserRecord};

    fn meta() -> MixerMeta {
        MixerMeta {
            user: UserRecord {
                id: 1,
                email: "a@b".into(),
                password_hash: String::new(),
                app_token: "user-app".into(),
                auth_token: "user-auth".into(),
                created_at: None,
            },
            user_data: UpstreamUser {
                id: 10,
                email: "a@b".into(),
                organizations: vec![NamedRef { id: 100, name: "Acme".into() }],
                projects: vec![NamedRef { id: 200, name: "Apollo".into() }],
            },
        }
    }

    // ── CredentialInjector ───────────────────────────────────────

    fn injector() -> CredentialInjector {
        CredentialInjector {
            upstream_app_token: "real-app".into(),
            upstream_auth_token: "real-auth".into(),
        }
    }

    fn authed_request() -> UpstreamRequest {
        let mut req = UpstreamRequest::new("get", "https://api.example.com/v1/users");
        req.set_header("App-Token", "user-app");
        req.set_header("Auth-Token", "user-auth");
        req
    }

    #[test]
    fn valid_tokens_are_replaced_with_upstream_credentials() {
        let mut req = authed_request();
        injector().process(&mut req, &meta()).unwrap();
        assert_eq!(req.get_header("App-Token"), Some("real-app"));
        assert_eq!(req.get_header("Auth-Token"), Some("real-auth"));
    }

    #[test]
    fn missing_app_token_fails() {
        let mut req = UpstreamRequest::new("get", "https://api.example.com/v1/users");
        let err = injector().process(&mut req, &meta()).unwrap_err();
        assert!(matches!(err, ProxyError::BadCredentials(msg) if msg.contains("Missing app token")));
    }

    #[test]
    fn wrong_auth_token_fails() {
        let mut req = authed_request();
        req.set_header("Auth-Token", "forged");
        let err = injector().process(&mut req, &meta()).unwrap_err();
        assert!(matches!(err, ProxyError::BadCredentials(msg) if msg.contains("Wrong auth token")));
    }

    // ── PersonalFilter ───────────────────────────────────────────

    #[test]
    fn filters_by_email_field() {
        let out = PersonalFilter.process(
            json!({"users": [{"email": "a@b"}, {"email": "c@d"}]}),
            &meta(),
        );
        assert_eq!(out, json!({"users": [{"email": "a@b"}]}));
    }

    #[test]
    fn filters_by_nested_user_email() {
        let out = PersonalFilter.process(
            json!({"memberships": [
                {"user": {"email": "a@b"}, "rate": 1},
                {"user": {"email": "c@d"}, "rate": 2},
            ]}),
            &meta(),
        );
        assert_eq!(out["memberships"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn filters_organizations_by_name() {
        let out = PersonalFilter.process(
            json!({"organizations": [{"name": "Acme"}, {"name": "Globex"}]}),
            &meta(),
        );
        assert_eq!(out, json!({"organizations": [{"name": "Acme"}]}));
    }

    #[test]
    fn filters_projects_by_name() {
        let out = PersonalFilter.process(
            json!({"projects": [{"name": "Apollo"}, {"name": "Artemis"}]}),
            &meta(),
        );
        assert_eq!(out, json!({"projects": [{"name": "Apollo"}]}));
    }

    #[test]
    fn filters_by_user_id() {
        let out = PersonalFilter.process(
            json!({"activities": [{"user_id": 10, "t": 1}, {"user_id": 11, "t": 2}]}),
            &meta(),
        );
        assert_eq!(out["activities"], json!([{"user_id": 10, "t": 1}]));
    }

    #[test]
    fn filters_by_project_id() {
        let out = PersonalFilter.process(
            json!({"tasks": [{"project_id": 200}, {"project_id": 201}]}),
            &meta(),
        );
        assert_eq!(out["tasks"], json!([{"project_id": 200}]));
    }

    #[test]
    fn unknown_list_shape_passes_through() {
        let payload = json!({"totals": [{"sum": 4}, {"sum": 5}]});
        let out = PersonalFilter.process(payload.clone(), &meta());
        assert_eq!(out, payload);
    }

    #[test]
    fn non_list_values_pass_through() {
        let payload = json!({"count": 3, "page": {"offset": 0}, "empty": []});
        let out = PersonalFilter.process(payload.clone(), &meta());
        assert_eq!(out, payload);
    }

    #[test]
    fn non_mapping_payload_passes_through() {
        let payload = json!([1, 2, 3]);
        assert_eq!(PersonalFilter.process(payload.clone(), &meta()), payload);
    }

    // ── ResultWrapper ────────────────────────────────────────────

    #[test]
    fn wraps_payload_under_result() {
        let out = ResultWrapper.process(json!({"users": []}), &meta());
        assert_eq!(out, json!({"result": {"users": []}}));
    }

    #[test]
    fn chained_filter_then_wrap_matches_redaction_scenario() {
        let m = meta();
        let upstream = json!({"users": [{"email": "a@b"}, {"email": "c@d"}]});
        let filtered = PersonalFilter.process(upstream, &m);
        let wrapped = ResultWrapper.process(filtered, &m);
        assert_eq!(wrapped, json!({"result": {"users": [{"email": "a@b"}]}}));
    }
}
