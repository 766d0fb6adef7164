//! Lookups over JSON responses.

use serde_json::{Map, Value};

const ENRICHED_DROP: &[&str] = &[
    "additionalProperties",
    "additionalPropertiesNode",
    "finalizers",
    "markedForDeletion",
    "plural",
    "singular",
];

/// Render a scalar the way a shell pipeline would print it: strings without
/// quotes, everything else as JSON.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn elements<'a>(doc: &'a Value, list_key: Option<&str>) -> &'a [Value] {
    let list = match list_key {
        Some(key) => doc.get(key),
        None => Some(doc),
    };
    list.and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// `field` of the first element of `doc[list_key]` (or of `doc` itself when
/// `list_key` is `None`) whose `match_field` equals `match_value`.
pub fn select_field<'a>(
    doc: &'a Value,
    list_key: Option<&str>,
    match_field: &str,
    match_value: &str,
    field: &str,
) -> Option<&'a Value> {
    elements(doc, list_key)
        .iter()
        .filter(|item| item.get(match_field).and_then(Value::as_str) == Some(match_value))
        .find_map(|item| item.get(field).filter(|value| !value.is_null()))
}

/// Id of the policy called `name` in a policy listing. Management BaaS
/// listings keep the id in `pid`, older ones in `id` either under `list` or at
/// the top level. Empty when the policy is absent.
pub fn policy_id(doc: &Value, name: &str, baas: bool) -> String {
    let found = if baas {
        select_field(doc, Some("list"), "name", name, "pid")
    } else {
        select_field(doc, Some("list"), "name", name, "id")
            .or_else(|| select_field(doc, None, "name", name, "id"))
    };
    found.map(scalar_to_string).unwrap_or_default()
}

/// Parse `text` and look up a policy id in it.
pub fn policy_id_in(text: &str, name: &str, baas: bool) -> String {
    serde_json::from_str(text)
        .map(|doc: Value| policy_id(&doc, name, baas))
        .unwrap_or_default()
}

/// Ids (`list[].<entity>.<id_key>`) of the listed entries holding the role
/// called `role`.
pub fn members_with_role(doc: &Value, role: &str, entity: &str, id_key: &str) -> Vec<String> {
    elements(doc, Some("list"))
        .iter()
        .filter(|item| {
            item.get("roles")
                .and_then(Value::as_array)
                .is_some_and(|roles| {
                    roles
                        .iter()
                        .any(|r| r.get("name").and_then(Value::as_str) == Some(role))
                })
        })
        .filter_map(|item| item.get(entity)?.get(id_key).map(scalar_to_string))
        .collect()
}

/// Whether a listing contains an element whose `key` is exactly `id`.
pub fn contains_id(doc: &Value, key: &str, id: &str) -> bool {
    fn search(value: &Value, key: &str, id: &str) -> bool {
        match value {
            Value::Object(map) => {
                map.get(key).and_then(Value::as_str) == Some(id)
                    || map.values().any(|v| search(v, key, id))
            }
            Value::Array(items) => items.iter().any(|v| search(v, key, id)),
            _ => false,
        }
    }
    search(doc, key, id)
}

/// Strip bookkeeping fields from a custom resource and lift its `spec` and
/// `status` members to the top level.
pub fn enriched(doc: &Value) -> Value {
    fn strip(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !ENRICHED_DROP.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), strip(value)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(strip).collect()),
            other => other.clone(),
        }
    }

    let stripped = strip(doc);
    let Value::Object(map) = stripped else {
        return stripped;
    };

    let mut out = Map::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) if key == "spec" || key == "status" => out.extend(inner),
            value => {
                out.insert(key, value);
            }
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn policy_ids() {
        let baas = json!({"list": [{"name": "p1", "pid": "abc"}, {"name": "p2", "pid": "def"}]});
        assert_eq!(policy_id(&baas, "p2", true), "def");
        assert_eq!(policy_id(&baas, "p3", true), "");

        let legacy_list = json!({"list": [{"name": "p1", "id": 7}]});
        assert_eq!(policy_id(&legacy_list, "p1", false), "7");

        let legacy_array = json!([{"name": "p1", "id": "x1"}]);
        assert_eq!(policy_id(&legacy_array, "p1", false), "x1");
        assert_eq!(policy_id_in("not json", "p1", false), "");
    }

    #[test]
    fn members() {
        let doc = json!({"list": [
            {"user": {"uid": "u1"}, "roles": [{"name": "admin"}]},
            {"user": {"uid": "u2"}, "roles": [{"name": "viewer"}]},
            {"user": {"uid": "u3"}, "roles": [{"name": "viewer"}, {"name": "admin"}]},
        ]});
        assert_eq!(members_with_role(&doc, "admin", "user", "uid"), vec!["u1", "u3"]);
    }

    #[test]
    fn ids() {
        let doc = json!({"list": [{"uid": "anna"}, {"uid": "bob"}]});
        assert!(contains_id(&doc, "uid", "bob"));
        assert!(!contains_id(&doc, "uid", "bo"));
        assert!(!contains_id(&doc, "gid", "bob"));
    }

    #[test]
    fn enrich() {
        let doc = json!({
            "apiVersion": "v1",
            "metadata": {"name": "x", "finalizers": ["a"]},
            "spec": {"replicas": 2, "plural": "xs"},
            "status": {"readyInstances": "2/2"},
        });
        assert_eq!(
            enriched(&doc),
            json!({
                "apiVersion": "v1",
                "metadata": {"name": "x"},
                "replicas": 2,
                "readyInstances": "2/2",
            })
        );
    }
}
