use serde_json::{Map, Value};

/// A canonical upstream request under assembly: the output of reversal,
/// mutated by the request-processor chain, consumed by the dispatcher.
///
/// Header names are stored lowercased; lookups are case-insensitive either
/// way. The canonical header casing is restored by the HTTP client layer.
#[derive(Debug, Clone, Default)]
pub struct UpstreamRequest {
    /// Lowercase HTTP method
    pub method: String,

    /// Fully assembled URL (base + formatted canonical path)
    pub url: String,

    pub headers: Vec<(String, String)>,

    pub query: Vec<(String, String)>,

    /// JSON body, one entry per canonical body parameter
    pub body: Map<String, Value>,

    /// Form body (`application/x-www-form-urlencoded`)
    pub form: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Get a header value (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value (case-insensitive).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_lowercase(), value)),
        }
    }

    /// Get a form field value.
    pub fn get_form(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// A body field, looked up in the form fields first (the canonical auth
    /// operation consumes form-encoded bodies) and the JSON body second.
    pub fn body_field(&self, name: &str) -> Option<&str> {
        self.get_form(name)
            .or_else(|| self.body.get(name).and_then(Value::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut req = UpstreamRequest::new("get", "https://api.example.com/v1/users");
        req.set_header("App-Token", "abc");
        assert_eq!(req.get_header("app-token"), Some("abc"));
        assert_eq!(req.get_header("APP-TOKEN"), Some("abc"));
    }

    #[test]
    fn set_header_replaces_in_place() {
        let mut req = UpstreamRequest::new("get", "https://api.example.com/v1/users");
        req.set_header("Auth-Token", "one");
        req.set_header("auth-token", "two");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.get_header("Auth-Token"), Some("two"));
    }

    #[test]
    fn body_field_prefers_form() {
        let mut req = UpstreamRequest::new("post", "https://api.example.com/v1/auth");
        req.form.push(("email".into(), "a@b".into()));
        req.body
            .insert("email".into(), Value::String("json@b".into()));
        assert_eq!(req.body_field("email"), Some("a@b"));
        assert_eq!(req.body_field("password"), None);
    }
}
