use regex::Regex;
use std::fmt;

/// A single field of a [`Parameter`]. `Wildcard` matches any value on the
/// other side; it stands in for operations that declare no parameters and for
/// observed values whose name is not known yet (e.g. the synthetic path
/// parameter extracted from an incoming request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamField {
    Concrete(String),
    Wildcard,
}

impl ParamField {
    pub fn concrete(value: impl Into<String>) -> Self {
        ParamField::Concrete(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamField::Concrete(s) => Some(s.as_str()),
            ParamField::Wildcard => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ParamField::Wildcard)
    }

    /// Wildcard on either side matches; otherwise case-insensitive equality.
    fn matches(&self, other: &ParamField) -> bool {
        match (self, other) {
            (ParamField::Wildcard, _) | (_, ParamField::Wildcard) => true,
            (ParamField::Concrete(a), ParamField::Concrete(b)) => a.eq_ignore_ascii_case(b),
        }
    }
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamField::Concrete(s) => write!(f, "{s}"),
            ParamField::Wildcard => write!(f, "*"),
        }
    }
}

/// A named, located input to an operation: `(path, method, location, name)`.
///
/// Paths containing `{x}` placeholders carry a compiled anchored regex so the
/// template also matches concrete observed paths (`/v1/users/{id}` matches
/// `/v1/users/42`), with the placeholder value available as a capture.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub path: String,
    pub method: ParamField,
    pub location: ParamField,
    pub name: ParamField,
    re_path: Option<Regex>,
}

impl Parameter {
    pub fn new(
        path: impl Into<String>,
        method: ParamField,
        location: ParamField,
        name: ParamField,
    ) -> Self {
        let path = path.into();
        let re_path = compile_path_regex(&path);
        Self {
            path,
            method,
            location,
            name,
            re_path,
        }
    }

    /// The wildcard dummy recorded for an operation with no parameters; pins
    /// `(path, method)` while matching any location and name.
    pub fn wildcard(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(
            path,
            ParamField::concrete(method),
            ParamField::Wildcard,
            ParamField::Wildcard,
        )
    }

    /// A fully concrete parameter, as declared in a Swagger operation.
    pub fn from_spec(
        path: impl Into<String>,
        method: impl Into<String>,
        location: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(
            path,
            ParamField::concrete(method),
            ParamField::concrete(location),
            ParamField::concrete(name),
        )
    }

    /// Field-wise equality with wildcard semantics; the path field also
    /// matches when either side's placeholder template expands to the other.
    pub fn matches(&self, other: &Parameter) -> bool {
        self.path_matches(other)
            && self.method.matches(&other.method)
            && self.location.matches(&other.location)
            && self.name.matches(&other.name)
    }

    fn path_matches(&self, other: &Parameter) -> bool {
        if self.path.eq_ignore_ascii_case(&other.path) {
            return true;
        }
        if let Some(re) = &self.re_path
            && re.is_match(&other.path)
        {
            return true;
        }
        if let Some(re) = &other.re_path
            && re.is_match(&self.path)
        {
            return true;
        }
        false
    }

    /// Extract `{x}` placeholder values from a concrete observed path.
    /// Returns one `(placeholder, value)` pair per named capture.
    pub fn path_captures(&self, observed_path: &str) -> Vec<(String, String)> {
        let Some(re) = &self.re_path else {
            return Vec::new();
        };
        let Some(caps) = re.captures(observed_path) else {
            return Vec::new();
        };
        re.capture_names()
            .flatten()
            .filter_map(|group| {
                caps.name(group)
                    .map(|m| (group.to_string(), m.as_str().to_string()))
            })
            .collect()
    }

    /// Whether the path carries at least one `{x}` placeholder.
    pub fn is_templated(&self) -> bool {
        self.re_path.is_some()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({} {})",
            self.method, self.path, self.location, self.name
        )
    }
}

/// Compile `/a/{x}/b` into `^/a/(?P<x>[^/]+?)/b$`. Returns `None` for paths
/// without placeholders, or when a malformed template fails to compile.
fn compile_path_regex(path: &str) -> Option<Regex> {
    if !path.contains('{') {
        return None;
    }

    let mut pattern = String::from("^");
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let (literal, tail) = rest.split_at(open);
        pattern.push_str(&regex::escape(literal));
        match tail[1..].find('}') {
            Some(close) => {
                let name = &tail[1..1 + close];
                pattern.push_str(&format!("(?P<{}>[^/]+?)", sanitize_group_name(name)));
                rest = &tail[close + 2..];
            }
            None => {
                // unbalanced brace, treat the remainder as a literal
                pattern.push_str(&regex::escape(tail));
                rest = "";
            }
        }
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to compile path template");
            None
        }
    }
}

/// Regex group names must be identifiers; swagger parameter names may not be.
fn sanitize_group_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_field() {
        let dummy = Parameter::wildcard("/v1/users", "get");
        let observed = Parameter::from_spec("/v1/users", "get", "path", "anything");
        assert!(dummy.matches(&observed));
        assert!(observed.matches(&dummy));
    }

    #[test]
    fn concrete_fields_compare_case_insensitively() {
        let a = Parameter::from_spec("/v1/users", "get", "header", "App-Token");
        let b = Parameter::from_spec("/v1/users", "GET", "Header", "app-token");
        assert!(a.matches(&b));
    }

    #[test]
    fn differing_names_do_not_match() {
        let a = Parameter::from_spec("/v1/users", "get", "query", "page_limit");
        let b = Parameter::from_spec("/v1/users", "get", "query", "offset");
        assert!(!a.matches(&b));
    }

    #[test]
    fn templated_path_matches_concrete_path() {
        let template = Parameter::from_spec("/v1/users/{id}", "get", "path", "id");
        let observed = Parameter::new(
            "/v1/users/42",
            ParamField::concrete("get"),
            ParamField::concrete("path"),
            ParamField::Wildcard,
        );
        assert!(template.matches(&observed));
        assert!(observed.matches(&template));
    }

    #[test]
    fn templated_path_does_not_match_extra_segments() {
        let template = Parameter::from_spec("/v1/users/{id}", "get", "path", "id");
        let observed = Parameter::wildcard("/v1/users/42/projects", "get");
        assert!(!template.matches(&observed));
    }

    #[test]
    fn placeholder_does_not_span_slashes() {
        let template = Parameter::from_spec("/v1/users/{id}/projects", "get", "path", "id");
        let ok = Parameter::wildcard("/v1/users/42/projects", "get");
        let bad = Parameter::wildcard("/v1/users/4/2/projects", "get");
        assert!(template.matches(&ok));
        assert!(!template.matches(&bad));
    }

    #[test]
    fn path_captures_extract_placeholder_value() {
        let template = Parameter::from_spec("/v1/users/{id}/projects", "get", "path", "id");
        let caps = template.path_captures("/v1/users/42/projects");
        assert_eq!(caps, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn path_captures_multiple_placeholders() {
        let template = Parameter::from_spec("/v1/users/{uid}/projects/{pid}", "get", "path", "uid");
        let caps = template.path_captures("/v1/users/7/projects/9");
        assert_eq!(caps.len(), 2);
        assert!(caps.contains(&("uid".to_string(), "7".to_string())));
        assert!(caps.contains(&("pid".to_string(), "9".to_string())));
    }

    #[test]
    fn template_matches_its_own_literal_form() {
        // Both sides carry the same template string.
        let a = Parameter::from_spec("/v1/users/{id}", "get", "path", "id");
        let b = Parameter::from_spec("/v1/users/{id}", "get", "path", "id");
        assert!(a.matches(&b));
    }

    #[test]
    fn untemplated_path_has_no_captures() {
        let p = Parameter::from_spec("/v1/users", "get", "query", "offset");
        assert!(!p.is_templated());
        assert!(p.path_captures("/v1/users").is_empty());
    }
}
