//! Path-addressed edits of a resource body.
//!
//! Paths look like `/spec/template/containers/0/image`: segments are object
//! keys, or array indices when the current value is an array. The last segment
//! names the key that is written or removed, and the value holding it must be
//! an object.

use std::str::FromStr;

use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum PatchError {
    #[snafu(display("Path '{}' must start with '/' and name at least one field", path))]
    InvalidPath { path: String },

    #[snafu(display("Element is array, {} must be a number", segment))]
    NotAnIndex { segment: String },

    #[snafu(display("Path element {} does not exist", segment))]
    MissingElement { segment: String },

    #[snafu(display("Final element is not a map, so we can't patch this value"))]
    NotAMap,

    #[snafu(display("Operation {} not supported", operation))]
    UnsupportedOperation { operation: String },

    #[snafu(display("Type {} not supported", value_type))]
    UnsupportedType { value_type: String },

    #[snafu(display("Value '{}' is not a valid integer", value))]
    InvalidInteger {
        value: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Value '{}' is not a valid JSON object: {}", value, source))]
    InvalidJson {
        value: String,
        source: serde_json::Error,
    },
}

/// What to do with the addressed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Insert or overwrite the field.
    Set,
    /// Remove the field.
    Remove,
}

impl FromStr for Operation {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" | "UPDATE" => Ok(Self::Set),
            "DELETE" => Ok(Self::Remove),
            other => UnsupportedOperationSnafu { operation: other }.fail(),
        }
    }
}

/// One field edit.
#[derive(Clone, Debug)]
pub struct FieldPatch {
    pub path: String,
    pub operation: Operation,
    pub value: String,
    pub value_type: Option<String>,
}

impl FieldPatch {
    /// A patch that sets `path` to `value` interpreted as `value_type`.
    pub fn set(path: impl Into<String>, value: impl Into<String>, value_type: Option<&str>) -> Self {
        Self {
            path: path.into(),
            operation: Operation::Set,
            value: value.into(),
            value_type: value_type.map(str::to_owned),
        }
    }

    /// Build a patch from a `path | operation | value | type` row.
    pub fn from_row(row: &[String]) -> Result<Self, PatchError> {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or_default();
        Ok(Self {
            path: cell(0).to_owned(),
            operation: cell(1).parse()?,
            value: cell(2).to_owned(),
            value_type: Some(cell(3)).filter(|t| !t.is_empty()).map(str::to_owned),
        })
    }
}

/// Convert a textual value to JSON according to `value_type`
/// (`integer`, `string`, `boolean` or `json`, case insensitive).
pub fn typed_value(value: &str, value_type: Option<&str>) -> Result<Value, PatchError> {
    let Some(value_type) = value_type else {
        return Ok(Value::String(value.to_owned()));
    };
    match value_type.to_ascii_lowercase().as_str() {
        "integer" => value
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .context(InvalidIntegerSnafu { value }),
        "string" => Ok(Value::String(value.to_owned())),
        "boolean" => Ok(Value::Bool(value.eq_ignore_ascii_case("true"))),
        "json" => {
            let parsed: Map<String, Value> =
                serde_json::from_str(value).context(InvalidJsonSnafu { value })?;
            Ok(Value::Object(parsed))
        }
        _ => UnsupportedTypeSnafu { value_type }.fail(),
    }
}

/// Apply `patch` to `body` in place.
pub fn apply(body: &mut Value, patch: &FieldPatch) -> Result<(), PatchError> {
    let segments: Vec<&str> = patch.path.split('/').skip(1).collect();
    let (last, parents) = segments
        .split_last()
        .filter(|(last, _)| !last.is_empty())
        .context(InvalidPathSnafu { path: &patch.path })?;

    let mut current = body;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .get_mut(*segment)
                .context(MissingElementSnafu { segment: *segment })?,
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .ok()
                    .context(NotAnIndexSnafu { segment: *segment })?;
                items
                    .get_mut(index)
                    .context(MissingElementSnafu { segment: *segment })?
            }
            _ => return MissingElementSnafu { segment: *segment }.fail(),
        };
    }

    let map = current.as_object_mut().context(NotAMapSnafu)?;
    match patch.operation {
        Operation::Set => {
            let value = typed_value(&patch.value, patch.value_type.as_deref())?;
            map.insert((*last).to_owned(), value);
        }
        Operation::Remove => {
            map.remove(*last);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn body() -> Value {
        json!({
            "spec": {
                "replicas": 1,
                "containers": [{ "name": "a", "env": { "X": "1" } }],
            }
        })
    }

    #[test]
    fn set_integer() {
        let mut body = body();
        apply(&mut body, &FieldPatch::set("/spec/replicas", "3", Some("integer"))).unwrap();
        assert_eq!(body["spec"]["replicas"], json!(3));
    }

    #[test]
    fn set_through_array_index() {
        let mut body = body();
        apply(
            &mut body,
            &FieldPatch::set("/spec/containers/0/env/Y", "true", Some("Boolean")),
        )
        .unwrap();
        assert_eq!(body["spec"]["containers"][0]["env"], json!({"X": "1", "Y": true}));
    }

    #[test]
    fn set_json_object() {
        let mut body = body();
        apply(
            &mut body,
            &FieldPatch::set("/spec/extra", r#"{"a": [1, 2]}"#, Some("json")),
        )
        .unwrap();
        assert_eq!(body["spec"]["extra"], json!({"a": [1, 2]}));
    }

    #[test]
    fn untyped_is_string() {
        let mut body = body();
        apply(&mut body, &FieldPatch::set("/spec/replicas", "3", None)).unwrap();
        assert_eq!(body["spec"]["replicas"], json!("3"));
    }

    #[test]
    fn remove_field() {
        let row = ["/spec/replicas", "DELETE", "", ""].map(String::from);
        let mut body = body();
        apply(&mut body, &FieldPatch::from_row(&row).unwrap()).unwrap();
        assert_eq!(body["spec"].get("replicas"), None);
    }

    #[test]
    fn non_numeric_index() {
        let mut body = body();
        let err = apply(
            &mut body,
            &FieldPatch::set("/spec/containers/first/name", "b", None),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Element is array, first must be a number");
    }

    #[test]
    fn final_element_not_map() {
        let mut body = body();
        let err = apply(&mut body, &FieldPatch::set("/spec/replicas/x", "1", None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Final element is not a map, so we can't patch this value"
        );
    }

    #[test]
    fn unsupported_operation() {
        let row = ["/spec/replicas", "MERGE", "1", "integer"].map(String::from);
        let err = FieldPatch::from_row(&row).unwrap_err();
        assert_eq!(err.to_string(), "Operation MERGE not supported");
    }

    #[test]
    fn unsupported_type() {
        let err = typed_value("1", Some("float")).unwrap_err();
        assert_eq!(err.to_string(), "Type float not supported");
    }
}
