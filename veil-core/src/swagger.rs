use crate::error::ProxyError;
use serde_json::{Map, Value};
use std::path::Path;

/// HTTP methods a Swagger path item may carry, in specification order.
pub const METHODS: &[&str] = &["get", "put", "post", "patch", "delete"];

/// In-memory Swagger 2.0 document.
///
/// The document is kept as a raw `serde_json::Value` tree so every field the
/// model does not interpret survives verbatim through permutation and
/// serialization. Iteration order follows the source document (`serde_json`
/// is built with `preserve_order`).
#[derive(Debug, Clone)]
pub struct SwaggerDoc {
    root: Value,
}

impl SwaggerDoc {
    pub fn from_value(root: Value) -> Result<Self, ProxyError> {
        match root.get("paths") {
            Some(Value::Object(_)) => Ok(Self { root }),
            Some(_) => Err(ProxyError::Swagger("\"paths\" is not an object".into())),
            None => Err(ProxyError::Swagger("missing \"paths\"".into())),
        }
    }

    pub fn from_str(raw: &str) -> Result<Self, ProxyError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProxyError> {
        Self::from_str(&std::fs::read_to_string(path)?)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Serialize back to JSON text.
    pub fn to_json(&self) -> Result<String, ProxyError> {
        Ok(serde_json::to_string(&self.root)?)
    }

    pub fn host(&self) -> Option<&str> {
        self.root.get("host").and_then(Value::as_str)
    }

    pub fn set_host(&mut self, host: &str) {
        if let Value::Object(map) = &mut self.root {
            map.insert("host".to_string(), Value::String(host.to_string()));
        }
    }

    pub fn paths(&self) -> &Map<String, Value> {
        // Presence and shape are validated in from_value.
        self.root
            .get("paths")
            .and_then(Value::as_object)
            .unwrap_or(EMPTY_MAP.get_or_init(Map::new))
    }

    pub fn paths_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.root.get_mut("paths").and_then(Value::as_object_mut)
    }

    pub fn definitions(&self) -> Option<&Map<String, Value>> {
        self.root.get("definitions").and_then(Value::as_object)
    }

    pub fn definitions_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.root
            .get_mut("definitions")
            .and_then(Value::as_object_mut)
    }

    /// Iterate `(path, method, operation)` in document order. Non-method keys
    /// of a path item (summaries, vendor extensions) are skipped.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str, &Map<String, Value>)> {
        self.paths().iter().flat_map(|(path, item)| {
            item.as_object().into_iter().flat_map(move |methods| {
                methods
                    .iter()
                    .filter(|(method, _)| METHODS.contains(&method.as_str()))
                    .filter_map(move |(method, op)| {
                        op.as_object().map(|op| (path.as_str(), method.as_str(), op))
                    })
            })
        })
    }
}

/// Ordered parameter specs of one operation.
pub fn operation_parameters(op: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    op.get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

static EMPTY_MAP: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> SwaggerDoc {
        SwaggerDoc::from_value(json!({
            "swagger": "2.0",
            "host": "api.hubstaff.com",
            "x-vendor-note": "kept verbatim",
            "paths": {
                "/v1/users": {
                    "get": {
                        "parameters": [
                            {"name": "organization_memberships", "in": "query", "type": "boolean"},
                            {"name": "offset", "in": "query", "type": "integer"}
                        ]
                    }
                },
                "/v1/users/{id}": {
                    "get": {
                        "parameters": [
                            {"name": "id", "in": "path", "required": true}
                        ]
                    },
                    "put": {
                        "parameters": []
                    }
                }
            },
            "definitions": {
                "user": {"type": "object"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn rejects_document_without_paths() {
        assert!(SwaggerDoc::from_value(json!({"swagger": "2.0"})).is_err());
        assert!(SwaggerDoc::from_value(json!({"paths": []})).is_err());
    }

    #[test]
    fn operations_iterate_in_document_order() {
        let doc = doc();
        let ops: Vec<(&str, &str)> = doc.operations().map(|(p, m, _)| (p, m)).collect();
        assert_eq!(
            ops,
            vec![
                ("/v1/users", "get"),
                ("/v1/users/{id}", "get"),
                ("/v1/users/{id}", "put"),
            ]
        );
    }

    #[test]
    fn parameters_iterate_in_document_order() {
        let doc = doc();
        let (_, _, op) = doc.operations().next().unwrap();
        let names: Vec<&str> = operation_parameters(op)
            .filter_map(|p| p.get("name").and_then(Value::as_str))
            .collect();
        assert_eq!(names, vec!["organization_memberships", "offset"]);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let doc = doc();
        let text = doc.to_json().unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed["x-vendor-note"], "kept verbatim");
    }

    #[test]
    fn set_host_overrides() {
        let mut doc = doc();
        assert_eq!(doc.host(), Some("api.hubstaff.com"));
        doc.set_host("proxy.example.com:9080");
        assert_eq!(doc.host(), Some("proxy.example.com:9080"));
    }

    #[test]
    fn definitions_accessors() {
        let mut doc = doc();
        assert!(doc.definitions().unwrap().contains_key("user"));
        doc.definitions_mut()
            .unwrap()
            .insert("extra".into(), json!({"type": "string"}));
        assert!(doc.definitions().unwrap().contains_key("extra"));
    }
}
