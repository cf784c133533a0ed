//! The per-request reverse/dispatch pipeline.
//!
//! `handle` walks the stages in a fixed order: admission gates, mixer
//! acquisition, observed-parameter extraction, reversal onto the canonical
//! contract, canonical request assembly, the local auth shadow, the
//! request-processor chain, upstream dispatch, and the result-processor
//! chain. Any stage may short-circuit with a `ProxyError`; the HTTP layer
//! wraps those into the permuted error shape.

use crate::request::ObservedRequest;
use crate::upstream::UpstreamApi;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use veil_core::config::UpstreamConfig;
use veil_core::{ParamField, Parameter, ProxyError, SwaggerDoc, UserRecord};
use veil_engine::mixer::{Mixer, MixerMeta, MixerOptions};
use veil_engine::processor::{
    CredentialInjector, PersonalFilter, RequestProcessor, ResultProcessor, ResultWrapper,
};
use veil_engine::request::UpstreamRequest;
use veil_engine::MixerCache;
use veil_store::{AbuseLog, UserStore};

/// What the pipeline hands back to the HTTP layer: an upstream (or locally
/// produced) status code and the fully shaped JSON body.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Value,
}

pub struct Pipeline {
    canonical: SwaggerDoc,
    upstream: Arc<dyn UpstreamApi>,
    users: Arc<UserStore>,
    abuse: Arc<AbuseLog>,
    mixers: MixerCache,
    options: MixerOptions,
    upstream_config: UpstreamConfig,
}

impl Pipeline {
    pub fn new(
        canonical: SwaggerDoc,
        upstream: Arc<dyn UpstreamApi>,
        users: Arc<UserStore>,
        abuse: Arc<AbuseLog>,
        mixers: MixerCache,
        options: MixerOptions,
        upstream_config: UpstreamConfig,
    ) -> Self {
        Self {
            canonical,
            upstream,
            users,
            abuse,
            mixers,
            options,
            upstream_config,
        }
    }

    /// Build (or fetch from cache) the mixer for a user. A miss bootstraps
    /// the user's upstream record via `/users` paging, then runs the
    /// permutation pipeline under the user's id as seed.
    pub async fn mixer_for(&self, user: UserRecord) -> Result<Arc<Mixer>, ProxyError> {
        let user_id = user.id;
        self.mixers
            .get_or_build(user_id, async {
                tracing::info!(user_id = user_id, email = %user.email, "Building mixer");
                let user_data = self.upstream.fetch_user(&user.email).await?;

                let request_processors: Vec<Box<dyn RequestProcessor>> =
                    vec![Box::new(CredentialInjector {
                        upstream_app_token: self.upstream_config.app_token.clone(),
                        upstream_auth_token: self.upstream_config.auth_token.clone(),
                    })];
                let result_processors: Vec<Box<dyn ResultProcessor>> =
                    vec![Box::new(PersonalFilter), Box::new(ResultWrapper)];

                Ok(Arc::new(Mixer::build(
                    self.canonical.clone(),
                    user_id,
                    MixerMeta { user, user_data },
                    &self.options,
                    request_processors,
                    result_processors,
                )?))
            })
            .await
    }

    /// Handle one request on the permuted surface for `user_pk`.
    pub async fn handle(
        &self,
        user_pk: i64,
        request: ObservedRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        // Admission gates.
        if self.abuse.globally_blocked() {
            return Err(ProxyError::GloballyThrottled);
        }
        let user = self
            .users
            .get(user_pk)
            .ok_or(ProxyError::UserNotFound(user_pk))?;
        if self.abuse.user_blocked(user_pk) {
            return Err(ProxyError::UserThrottled);
        }

        // Mixer acquisition.
        let mixer = self.mixer_for(user.clone()).await?;

        // Parse the observed request into an ordered parameter mapping.
        let observed = observe(&request)?;

        // Reverse every observed parameter onto the canonical contract.
        let canonical = reverse_all(&mixer, &request, observed)?;

        // Assemble the canonical upstream request.
        let mut upstream_request = build_upstream_request(
            self.upstream_config.base_url.trim_end_matches('/'),
            &canonical,
        )?;

        // The canonical auth endpoint is shadowed locally so clients never
        // reach the real one.
        let (status, result) = if upstream_request.url == self.upstream_config.auth_url() {
            (200, self.shadow_auth(&user, &upstream_request)?)
        } else {
            // Request processors (credential verification + injection).
            mixer.process_request(&mut upstream_request)?;

            // Dispatch.
            let response = self.upstream.send(&upstream_request).await?;
            if response.status == 401 {
                self.abuse.record_failure(user.id);
            }
            (response.status, response.body)
        };

        // Result processors (personal filter, result wrapper).
        let body = mixer.process_result(result);

        // Respond with the upstream's status code.
        Ok(ProxyResponse { status, body })
    }

    /// Verify auth-shadow credentials against the local user record and mint
    /// the response the upstream would have produced.
    fn shadow_auth(
        &self,
        user: &UserRecord,
        request: &UpstreamRequest,
    ) -> Result<Value, ProxyError> {
        let email = request.body_field("email").unwrap_or_default();
        if email != user.email {
            return Err(ProxyError::BadCredentials(format!(
                "Wrong email provided: {email}"
            )));
        }

        let password = request.body_field("password").unwrap_or_default();
        if !UserStore::verify_password(user, password) {
            return Err(ProxyError::BadCredentials("Password mismatch".into()));
        }

        if request.get_header("app-token").unwrap_or_default() != user.app_token {
            return Err(ProxyError::BadCredentials("App-Token mismatch".into()));
        }

        tracing::info!(user_id = user.id, "Auth shadow issued local token");
        Ok(json!({
            "id": null,
            "name": null,
            "last_activity": null,
            "auth_token": user.auth_token,
        }))
    }
}

/// One `(Parameter, value)` entry per observed input, in a fixed
/// order — the synthetic path parameter first, then headers, form fields,
/// query parameters, and JSON body keys.
fn observe(request: &ObservedRequest) -> Result<Vec<(Parameter, Value)>, ProxyError> {
    let mut observed = Vec::new();

    observed.push((
        Parameter::new(
            request.path.clone(),
            ParamField::concrete(&request.method),
            ParamField::concrete("path"),
            ParamField::Wildcard,
        ),
        Value::Null,
    ));

    for (name, value) in &request.headers {
        observed.push((
            Parameter::from_spec(&request.path, &request.method, "header", name),
            Value::String(value.clone()),
        ));
    }
    for (name, value) in &request.form {
        observed.push((
            Parameter::from_spec(&request.path, &request.method, "formData", name),
            Value::String(value.clone()),
        ));
    }
    for (name, value) in &request.query {
        observed.push((
            Parameter::from_spec(&request.path, &request.method, "query", name),
            Value::String(value.clone()),
        ));
    }

    if let Some(body) = &request.body {
        let Value::Object(map) = body else {
            return Err(ProxyError::BadBody("body is not a JSON object".into()));
        };
        for (name, value) in map {
            observed.push((
                Parameter::from_spec(&request.path, &request.method, "body", name),
                value.clone(),
            ));
        }
    }

    Ok(observed)
}

/// Resolve each observed parameter. Unmatched path and header
/// entries are dropped silently (clients send plenty of standard headers with
/// no canonical counterpart); anything else unmatched fails the request.
fn reverse_all(
    mixer: &Mixer,
    request: &ObservedRequest,
    observed: Vec<(Parameter, Value)>,
) -> Result<Vec<(Parameter, Value)>, ProxyError> {
    let mut canonical = Vec::new();

    for (observed_param, mut value) in observed {
        match mixer.reverse(&observed_param) {
            Ok((permuted_definition, canonical_param)) => {
                tracing::debug!(observed = %observed_param, canonical = %canonical_param, "Reversed parameter");
                if canonical_param.location.as_str() == Some("path") {
                    value = extract_path_value(permuted_definition, &request.path)?;
                }
                canonical.push((canonical_param.clone(), value));
            }
            Err(_) => {
                match observed_param.location.as_str() {
                    Some("path") | Some("header") => {
                        tracing::debug!(parameter = %observed_param, "Ignoring unexpected parameter");
                    }
                    _ => {
                        return Err(ProxyError::UnexpectedParameter {
                            method: request.method.to_uppercase(),
                            path: request.path.clone(),
                            location: observed_param.location.to_string().to_uppercase(),
                            name: observed_param.name.to_string(),
                            value: value_to_string(&value),
                        });
                    }
                }
            }
        }
    }

    Ok(canonical)
}

/// Pull the placeholder value out of the observed concrete path using the
/// permuted definition's compiled template.
fn extract_path_value(definition: &Parameter, observed_path: &str) -> Result<Value, ProxyError> {
    let captures = definition.path_captures(observed_path);
    match captures.len() {
        1 => Ok(Value::String(captures.into_iter().next().map(|(_, v)| v).unwrap_or_default())),
        0 => Err(ProxyError::Internal(format!(
            "path template {} captured nothing from {observed_path}",
            definition.path
        ))),
        _ => Err(ProxyError::Unsupported(
            "Multiple path parameters not supported".into(),
        )),
    }
}

/// Group the canonical entries by location and assemble the
/// upstream request. Every entry must agree on one `(path, method)`.
fn build_upstream_request(
    base_url: &str,
    canonical: &[(Parameter, Value)],
) -> Result<UpstreamRequest, ProxyError> {
    let Some((first, _)) = canonical.first() else {
        return Err(ProxyError::NoPayload);
    };

    let operations: HashSet<(String, String)> = canonical
        .iter()
        .map(|(p, _)| (p.path.clone(), p.method.to_string().to_lowercase()))
        .collect();
    if operations.len() != 1 {
        return Err(ProxyError::Unsupported(format!(
            "Inconsistent parameters: {} operations matched",
            operations.len()
        )));
    }

    let mut path = first.path.clone();
    for (param, value) in canonical {
        if param.location.as_str() == Some("path")
            && let Some(name) = param.name.as_str()
        {
            path = path.replace(&format!("{{{name}}}"), &value_to_string(value));
        }
    }

    let method = first.method.as_str().unwrap_or("get").to_string();
    let mut request = UpstreamRequest::new(method, format!("{base_url}{path}"));

    for (param, value) in canonical {
        let Some(name) = param.name.as_str() else {
            continue;
        };
        match param.location.as_str() {
            Some("header") => request
                .headers
                .push((name.to_lowercase(), value_to_string(value))),
            Some("query") => request.query.push((name.to_string(), value_to_string(value))),
            Some("formData") => request.form.push((name.to_string(), value_to_string(value))),
            Some("body") => {
                request.body.insert(name.to_string(), value.clone());
            }
            // `path` went into the URL; wildcard dummies only pin the
            // operation.
            _ => {}
        }
    }

    Ok(request)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
