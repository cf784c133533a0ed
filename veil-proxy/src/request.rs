use serde_json::Value;

/// An inbound request on the permuted surface, parsed by the HTTP layer into
/// the pieces the pipeline inspects. Header names are lowercased; values keep
/// their original form.
#[derive(Debug, Clone, Default)]
pub struct ObservedRequest {
    /// Lowercase HTTP method
    pub method: String,

    /// Request path, e.g. `/v7/people/42`
    pub path: String,

    pub headers: Vec<(String, String)>,

    pub query: Vec<(String, String)>,

    /// Form fields (`application/x-www-form-urlencoded` bodies)
    pub form: Vec<(String, String)>,

    /// Decoded JSON body, when the request carried one
    pub body: Option<Value>,
}

impl ObservedRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_lowercase(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}
