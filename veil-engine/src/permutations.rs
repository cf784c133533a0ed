//! The seed-driven permutation pipeline.
//!
//! Each permutation is a pure function over the document that seeds its own
//! generator from the mixer seed. Nothing here touches a process-global RNG,
//! so concurrent mixer builds for different seeds cannot interfere and the
//! output for a given `(document, seed)` pair is identical across runs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use veil_core::swagger::METHODS;
use veil_core::{ProxyError, SwaggerDoc, SynonymTable};

/// Methods eligible for re-labelling under [`permute_methods`].
const METHOD_POOL: &[&str] = &["get", "put", "post", "patch"];

/// Replace path segments with dictionary words.
///
/// `/v1/users/{id}/projects` becomes e.g. `/v7/people/{id}/tasks` for seed 7:
/// version segments turn into `v{seed}`, `{name}` segments stay untouched,
/// and every other token is mapped through a deterministic shuffle of its
/// synonym list. The mapping is memoized for the whole document, and no two
/// canonical tokens may receive the same replacement.
pub fn permute_paths(
    doc: &mut SwaggerDoc,
    seed: i64,
    synonyms: &SynonymTable,
) -> Result<(), ProxyError> {
    let mut rng = StdRng::seed_from_u64(seed as u64);

    // One shuffled candidate list per canonical token, drawn up front so the
    // draw sequence depends only on the table, not on the document.
    let candidates: HashMap<String, Vec<String>> = synonyms
        .iter()
        .map(|(token, alts)| {
            let mut pool: Vec<String> = alts.to_vec();
            pool.push(token.to_string());
            pool.shuffle(&mut rng);
            (token.to_string(), pool)
        })
        .collect();

    let mut assigned: HashMap<String, String> = HashMap::new();
    let mut used: HashSet<String> = HashSet::new();

    let mut permute_path = |path: &str| -> Result<String, ProxyError> {
        let mut permuted_parts = Vec::new();
        for part in path.split('/') {
            if part.is_empty() {
                permuted_parts.push(String::new());
            } else if is_version_segment(part) {
                permuted_parts.push(format!("v{seed}"));
            } else if part.starts_with('{') && part.ends_with('}') {
                permuted_parts.push(part.to_string());
            } else if let Some(replacement) = assigned.get(part) {
                permuted_parts.push(replacement.clone());
            } else {
                let fallback;
                let pool = match candidates.get(part) {
                    Some(pool) => pool.as_slice(),
                    None => {
                        tracing::warn!(token = %part, "No synonyms defined for path token");
                        fallback = [part.to_string()];
                        fallback.as_slice()
                    }
                };
                let replacement = pool
                    .iter()
                    .find(|candidate| !used.contains(*candidate))
                    .ok_or_else(|| ProxyError::OutOfSynonyms(part.to_string()))?;
                assigned.insert(part.to_string(), replacement.clone());
                used.insert(replacement.clone());
                permuted_parts.push(replacement.clone());
            }
        }
        Ok(permuted_parts.join("/"))
    };

    let Some(paths) = doc.paths_mut() else {
        return Ok(());
    };
    let old = std::mem::take(paths);
    for (path, item) in old {
        paths.insert(permute_path(&path)?, item);
    }
    Ok(())
}

/// Re-label the methods of every path with a deterministic shuffle of
/// `[get, put, post, patch]`, then move parameters so their locations stay
/// meaningful under the new method: everything that is not a header goes to
/// `query` for `get` and to `body` for `post|put|patch`.
pub fn permute_methods(doc: &mut SwaggerDoc, seed: i64) {
    let mut rng = StdRng::seed_from_u64(seed as u64);

    let Some(paths) = doc.paths_mut() else {
        return;
    };
    for item in paths.values_mut() {
        let Some(methods) = item.as_object_mut() else {
            continue;
        };
        let mut pool: Vec<&str> = METHOD_POOL.to_vec();
        pool.shuffle(&mut rng);

        let old = std::mem::take(methods);
        for (key, mut op) in old {
            if !METHODS.contains(&key.as_str()) {
                methods.insert(key, op);
                continue;
            }
            let new_method = match pool.pop() {
                Some(m) => m.to_string(),
                None => key,
            };
            rewrite_locations_for_method(&new_method, &mut op);
            methods.insert(new_method, op);
        }
    }
}

fn rewrite_locations_for_method(method: &str, op: &mut Value) {
    let Some(params) = op.get_mut("parameters").and_then(Value::as_array_mut) else {
        return;
    };
    for param in params.iter_mut() {
        let Some(spec) = param.as_object_mut() else {
            continue;
        };
        let current = spec.get("in").and_then(Value::as_str).unwrap_or_default();
        if current == "header" || current == "path" {
            continue;
        }
        let target = match method {
            "get" => "query",
            "post" | "put" | "patch" => "body",
            _ => continue,
        };
        spec.insert("in".to_string(), Value::String(target.to_string()));
    }
}

/// Move GET parameters between `query` and `header` on a deterministic coin
/// flip, one flip per parameter name for the whole document, so a name seen
/// in several operations always ends up in the same place. Renames follow the
/// target location's convention: `App-Token` style for headers, hyphen-free
/// `snake_case` for query strings.
pub fn permute_locations(doc: &mut SwaggerDoc, seed: i64) {
    let mut rng = StdRng::seed_from_u64(seed as u64);
    let mut locations: HashMap<String, String> = HashMap::new();

    let Some(paths) = doc.paths_mut() else {
        return;
    };
    for item in paths.values_mut() {
        let Some(methods) = item.as_object_mut() else {
            continue;
        };
        for (method, op) in methods.iter_mut() {
            if method != "get" {
                continue;
            }
            let Some(params) = op.get_mut("parameters").and_then(Value::as_array_mut) else {
                continue;
            };
            for param in params.iter_mut() {
                let Some(spec) = param.as_object_mut() else {
                    continue;
                };
                let Some(name) = spec.get("name").and_then(Value::as_str).map(str::to_string)
                else {
                    continue;
                };
                let Some(current) = spec.get("in").and_then(Value::as_str).map(str::to_string)
                else {
                    continue;
                };

                let target = match locations.get(&name) {
                    Some(persisted) => persisted.clone(),
                    None => {
                        let drawn = if rng.random_bool(0.5) {
                            match current.as_str() {
                                "query" => "header".to_string(),
                                "header" => "query".to_string(),
                                other => other.to_string(),
                            }
                        } else {
                            current.clone()
                        };
                        locations.insert(name.clone(), drawn.clone());
                        drawn
                    }
                };

                spec.insert("in".to_string(), Value::String(target.clone()));
                match target.as_str() {
                    "header" => {
                        spec.insert("name".to_string(), Value::String(header_style(&name)));
                    }
                    "query" => {
                        spec.insert("name".to_string(), Value::String(query_style(&name)));
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Wrap every response schema in `definitions` as
/// `{type: object, properties: {result: <original>}}`. The result-wrapper
/// processor applies the same shape to live payloads.
pub fn permute_result(doc: &mut SwaggerDoc) {
    let Some(defs) = doc.definitions_mut() else {
        return;
    };
    let old = std::mem::take(defs);
    for (name, schema) in old {
        defs.insert(
            name,
            json!({
                "type": "object",
                "properties": { "result": schema },
            }),
        );
    }
}

/// `v1`, `v2`, … — a `v` followed by at least one digit.
fn is_version_segment(part: &str) -> bool {
    let mut chars = part.chars();
    chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// `page_limit` → `Page-Limit`, `App-Token` → `App-Token` (idempotent).
pub fn header_style(name: &str) -> String {
    query_style(name)
        .split('_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("-")
}

/// `Page-Limit` → `page_limit`, `pageLimit` → `page_limit` (idempotent).
pub fn query_style(name: &str) -> String {
    let squashed: String = name.chars().filter(|c| *c != '-').collect();
    let mut out = String::new();
    for c in squashed.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
