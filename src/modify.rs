//! Data-table driven edits of JSON and plain text request bodies.
//!
//! A modification row reads `path | operation | value | type`. JSON paths
//! follow a small JSONPath subset: a `$` root followed by `.key` and `[index]`
//! segments.

use std::str::FromStr;

use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
pub enum ModifyError {
    #[snafu(display("Invalid JSON path {}", path))]
    InvalidPath { path: String },

    #[snafu(display("Element {} not found", path))]
    MissingElement { path: String },

    #[snafu(display("Element {} is not an array", path))]
    NotAnArray { path: String },

    #[snafu(display("Element {} is not a string", path))]
    NotAString { path: String },

    #[snafu(display("Value '{}' is not a valid {}", value, kind))]
    InvalidValue { value: String, kind: &'static str },

    #[snafu(display("Invalid JSON data: {}", source))]
    InvalidJson { source: serde_json::Error },

    #[snafu(display("Modification rows need path, operation and value: {:?}", row))]
    InvalidRow { row: Vec<String> },

    #[snafu(display("Operation {} not supported", operation))]
    UnknownOperation { operation: String },

    #[snafu(display("Type {} not supported", value_type))]
    UnknownType { value_type: String },

    #[snafu(display("Data type {} not supported", data_type))]
    UnknownDataType { data_type: String },

    #[snafu(display("Operation {:?} can not be applied to {:?} data", operation, data_type))]
    Unsupported {
        operation: Operation,
        data_type: DataType,
    },

    #[snafu(display("REPLACE value must be written as old->new, got '{}'", value))]
    InvalidReplacement { value: String },
}

pub type Result<T, E = ModifyError> = std::result::Result<T, E>;

/// Kind of the base data a request body is built from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataType {
    #[default]
    Json,
    /// Governance payloads, handled as JSON.
    Gov,
    String,
}

impl DataType {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::Gov)
    }
}

impl FromStr for DataType {
    type Err = ModifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "gov" => Ok(Self::Gov),
            "string" => Ok(Self::String),
            _ => UnknownDataTypeSnafu { data_type: s }.fail(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Delete,
    Add,
    Update,
    Replace,
    Append,
    Prepend,
    AddTo,
    /// Not a body edit: the row sets a request header named by the path.
    Header,
}

impl FromStr for Operation {
    type Err = ModifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DELETE" => Ok(Self::Delete),
            "ADD" => Ok(Self::Add),
            "UPDATE" => Ok(Self::Update),
            "REPLACE" => Ok(Self::Replace),
            "APPEND" => Ok(Self::Append),
            "PREPEND" => Ok(Self::Prepend),
            "ADDTO" => Ok(Self::AddTo),
            "HEADER" => Ok(Self::Header),
            _ => UnknownOperationSnafu { operation: s }.fail(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueType {
    #[default]
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
    Json,
}

impl FromStr for ValueType {
    type Err = ModifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "string" | "n/a" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            "null" => Ok(Self::Null),
            "json" => Ok(Self::Json),
            _ => UnknownTypeSnafu { value_type: s }.fail(),
        }
    }
}

impl ValueType {
    pub fn to_value(self, value: &str) -> Result<Value> {
        let parsed = |kind: &'static str| -> Result<Value> {
            serde_json::from_str(value)
                .ok()
                .context(InvalidValueSnafu { value, kind })
        };
        Ok(match self {
            Self::String => Value::String(value.to_owned()),
            Self::Null => Value::Null,
            Self::Json => serde_json::from_str(value).context(InvalidJsonSnafu)?,
            Self::Number => {
                let number = parsed("number")?;
                ensure!(number.is_number(), InvalidValueSnafu { value, kind: "number" });
                number
            }
            Self::Boolean => {
                let boolean = parsed("boolean")?;
                ensure!(boolean.is_boolean(), InvalidValueSnafu { value, kind: "boolean" });
                boolean
            }
            Self::Array if value.is_empty() => Value::Array(Vec::new()),
            Self::Array => {
                let array = parsed("array")?;
                ensure!(array.is_array(), InvalidValueSnafu { value, kind: "array" });
                array
            }
            Self::Object if value.is_empty() => Value::Object(Map::new()),
            Self::Object => {
                let object = parsed("object")?;
                ensure!(object.is_object(), InvalidValueSnafu { value, kind: "object" });
                object
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub path: String,
    pub operation: Operation,
    pub value: String,
    pub value_type: ValueType,
}

impl Modification {
    pub fn new(path: &str, operation: Operation, value: &str, value_type: ValueType) -> Self {
        Self {
            path: path.to_owned(),
            operation,
            value: value.to_owned(),
            value_type,
        }
    }

    /// Build a modification from a `path | operation | value [| type]` row.
    pub fn from_row(row: &[String]) -> Result<Self> {
        let (path, operation, value) = match row {
            [path, operation] => (path, operation, ""),
            [path, operation, value, ..] => (path, operation, value.as_str()),
            _ => return InvalidRowSnafu { row: row.to_vec() }.fail(),
        };
        let value_type = row.get(3).map_or(Ok(ValueType::String), |t| t.parse())?;
        Ok(Self::new(path, operation.parse()?, value, value_type))
    }

    pub fn from_rows(rows: &[Vec<String>]) -> Result<Vec<Self>> {
        rows.iter().map(|row| Self::from_row(row)).collect()
    }

    fn replacement(&self) -> Result<(&str, &str)> {
        self.value
            .split_once("->")
            .context(InvalidReplacementSnafu { value: &self.value })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let invalid = || InvalidPathSnafu { path }.build();
    let rest = path.strip_prefix('$').ok_or_else(invalid)?;
    let mut segments = Vec::new();
    let mut chars = rest.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '.' => {
                let mut end = rest.len();
                while let Some(&(i, next)) = chars.peek() {
                    if next == '.' || next == '[' {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                let key = &rest[start + 1..end];
                ensure!(!key.is_empty(), InvalidPathSnafu { path });
                segments.push(Segment::Key(key.to_owned()));
            }
            '[' => {
                let close = rest[start..].find(']').ok_or_else(invalid)? + start;
                let inner = rest[start + 1..close].trim_matches(|c| c == '\'' || c == '"');
                let segment = match inner.parse() {
                    Ok(index) => Segment::Index(index),
                    Err(_) if !inner.is_empty() => Segment::Key(inner.to_owned()),
                    Err(_) => return Err(invalid()),
                };
                segments.push(segment);
                while chars.peek().is_some_and(|&(i, _)| i <= close) {
                    chars.next();
                }
            }
            _ => return Err(invalid()),
        }
    }
    Ok(segments)
}

fn walk<'a>(doc: &'a mut Value, segments: &[Segment], path: &str) -> Result<&'a mut Value> {
    let mut current = doc;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get_mut(key),
            (Segment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        }
        .context(MissingElementSnafu { path })?;
    }
    Ok(current)
}

fn edit_string(target: &mut Value, path: &str, edit: impl FnOnce(&str) -> String) -> Result<()> {
    let text = target.as_str().context(NotAStringSnafu { path })?;
    *target = Value::String(edit(text));
    Ok(())
}

/// Apply a single modification to a JSON document.
pub fn apply_json(doc: &mut Value, modification: &Modification) -> Result<()> {
    if modification.operation == Operation::Header {
        return Ok(());
    }
    let path = modification.path.as_str();
    let segments = parse_path(path)?;

    match modification.operation {
        Operation::Header => Ok(()),
        Operation::Replace => {
            let (old, new) = modification.replacement()?;
            edit_string(walk(doc, &segments, path)?, path, |text| text.replace(old, new))
        }
        Operation::Append => edit_string(walk(doc, &segments, path)?, path, |text| {
            format!("{text}{}", modification.value)
        }),
        Operation::Prepend => edit_string(walk(doc, &segments, path)?, path, |text| {
            format!("{}{text}", modification.value)
        }),
        Operation::AddTo => {
            let value = modification.value_type.to_value(&modification.value)?;
            walk(doc, &segments, path)?
                .as_array_mut()
                .context(NotAnArraySnafu { path })?
                .push(value);
            Ok(())
        }
        Operation::Delete | Operation::Add | Operation::Update => {
            let Some((last, parents)) = segments.split_last() else {
                // The root itself.
                if modification.operation == Operation::Delete {
                    *doc = Value::Null;
                } else {
                    *doc = modification.value_type.to_value(&modification.value)?;
                }
                return Ok(());
            };
            let parent = walk(doc, parents, path)?;

            if modification.operation == Operation::Delete {
                match (last, parent) {
                    (Segment::Key(key), Value::Object(map)) => {
                        map.remove(key);
                    }
                    (Segment::Index(index), Value::Array(items)) if *index < items.len() => {
                        items.remove(*index);
                    }
                    _ => {}
                }
                return Ok(());
            }

            let value = modification.value_type.to_value(&modification.value)?;
            match (last, parent) {
                (Segment::Key(key), Value::Object(map)) => {
                    map.insert(key.clone(), value);
                }
                (Segment::Index(index), Value::Array(items)) if *index < items.len() => {
                    items[*index] = value;
                }
                (Segment::Index(index), Value::Array(items)) if *index == items.len() => {
                    items.push(value);
                }
                _ => return MissingElementSnafu { path }.fail(),
            }
            Ok(())
        }
    }
}

/// Apply a single modification to plain text. `DELETE` removes the text in
/// the path column, the other operations use the value column.
pub fn apply_string(text: &str, modification: &Modification) -> Result<String> {
    Ok(match modification.operation {
        Operation::Header => text.to_owned(),
        Operation::Delete => text.replace(&modification.path, ""),
        Operation::Replace => {
            let (old, new) = modification.replacement()?;
            text.replace(old, new)
        }
        Operation::Append => format!("{text}{}", modification.value),
        Operation::Prepend => format!("{}{text}", modification.value),
        operation => {
            return UnsupportedSnafu {
                operation,
                data_type: DataType::String,
            }
            .fail();
        }
    })
}

/// Apply all `modifications` to `data` in order and render the result.
pub fn modify(data: &str, data_type: DataType, modifications: &[Modification]) -> Result<String> {
    if !data_type.is_json() {
        return modifications
            .iter()
            .try_fold(data.to_owned(), |text, modification| {
                apply_string(&text, modification)
            });
    }

    let mut doc: Value = serde_json::from_str(data).context(InvalidJsonSnafu)?;
    for modification in modifications {
        apply_json(&mut doc, modification)?;
    }
    serde_json::to_string(&doc).context(InvalidJsonSnafu)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| (*cell).to_owned()).collect()
    }

    fn apply(doc: Value, cells: &[&str]) -> Result<Value> {
        let mut doc = doc;
        apply_json(&mut doc, &Modification::from_row(&row(cells))?)?;
        Ok(doc)
    }

    #[test]
    fn paths() {
        assert_eq!(
            parse_path("$.a.b[2].c").unwrap(),
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Key("c".into()),
            ]
        );
        assert_eq!(parse_path("$['x.y']").unwrap(), vec![Segment::Key("x.y".into())]);
        assert!(parse_path("a.b").is_err());
        assert!(parse_path("$..a").is_err());
    }

    #[test]
    fn add_update_delete() {
        let doc = json!({"name": "web", "spec": {"replicas": 1, "labels": ["a", "b"]}});

        let doc = apply(doc, &["$.spec.replicas", "UPDATE", "3", "number"]).unwrap();
        let doc = apply(doc, &["$.spec.enabled", "ADD", "true", "boolean"]).unwrap();
        let doc = apply(doc, &["$.spec.labels[0]", "DELETE", "n/a"]).unwrap();
        let doc = apply(doc, &["$.name", "DELETE", ""]).unwrap();

        assert_eq!(
            doc,
            json!({"spec": {"replicas": 3, "enabled": true, "labels": ["b"]}})
        );
    }

    #[test]
    fn missing_intermediate_object_is_an_error() {
        let error = apply(json!({}), &["$.a.b", "ADD", "x"]).unwrap_err();
        assert_eq!(error.to_string(), "Element $.a.b not found");
    }

    #[test]
    fn string_edits() {
        let doc = json!({"url": "http://host:80/path"});
        let doc = apply(doc, &["$.url", "REPLACE", "http->https"]).unwrap();
        let doc = apply(doc, &["$.url", "APPEND", "/more"]).unwrap();
        let doc = apply(doc, &["$.url", "PREPEND", ">"]).unwrap();
        assert_eq!(doc, json!({"url": ">https://host:80/path/more"}));

        let error = apply(json!({"n": 1}), &["$.n", "APPEND", "x"]).unwrap_err();
        assert_eq!(error.to_string(), "Element $.n is not a string");
    }

    #[test]
    fn add_to_array() {
        let doc = json!({"groups": []});
        let doc = apply(doc, &["$.groups", "ADDTO", r#"{"gid":"g1"}"#, "object"]).unwrap();
        let doc = apply(doc, &["$.groups", "ADDTO", "g2"]).unwrap();
        assert_eq!(doc, json!({"groups": [{"gid": "g1"}, "g2"]}));
    }

    #[test]
    fn typed_values() {
        assert_eq!(ValueType::Array.to_value("").unwrap(), json!([]));
        assert_eq!(ValueType::Array.to_value("[1,2]").unwrap(), json!([1, 2]));
        assert_eq!(ValueType::Object.to_value("").unwrap(), json!({}));
        assert_eq!(ValueType::Null.to_value("anything").unwrap(), Value::Null);
        assert_eq!(ValueType::Number.to_value("1.5").unwrap(), json!(1.5));
        assert!(ValueType::Number.to_value("abc").is_err());
        assert!(ValueType::Boolean.to_value("1").is_err());
        assert!("decimal".parse::<ValueType>().is_err());
    }

    #[test]
    fn plain_text() {
        let modifications = Modification::from_rows(&[
            row(&["secret", "DELETE", ""]),
            row(&["", "REPLACE", "world->there"]),
            row(&["", "APPEND", "!"]),
        ])
        .unwrap();
        assert_eq!(
            modify("hello secretworld", DataType::String, &modifications).unwrap(),
            "hello there!"
        );

        let add = Modification::from_row(&row(&["$.a", "ADD", "1"])).unwrap();
        assert!(modify("text", DataType::String, &[add]).is_err());
    }

    #[test]
    fn whole_document() {
        let modifications = Modification::from_rows(&[
            row(&["$.id", "UPDATE", "user1"]),
            row(&["cluster-owner", "HEADER", "true", "n/a"]),
        ])
        .unwrap();
        assert_eq!(
            modify(r#"{"id":"x"}"#, DataType::Gov, &modifications).unwrap(),
            r#"{"id":"user1"}"#
        );
    }

    #[test]
    fn bad_rows() {
        assert!(Modification::from_row(&row(&["$.a"])).is_err());
        let error = Modification::from_row(&row(&["$.a", "MERGE", "x"])).unwrap_err();
        assert_eq!(error.to_string(), "Operation MERGE not supported");
    }
}
