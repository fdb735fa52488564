//! Concrete values produced by resolving a node.

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A constructed record: logical field names in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Instance)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>, fields: Vec<(String, Instance)>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Name of the declared record this value was built as.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Instance> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// A validated value shaped by its declared type.
///
/// Unlike raw JSON, records remember which declared record they were built as, so
/// the member a union narrowed to stays observable.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Scalar(Value),
    Sequence(Vec<Instance>),
    Mapping(Vec<(String, Instance)>),
    Record(Record),
}

impl Instance {
    /// Shape a raw value without any type information.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                Instance::Sequence(items.into_iter().map(Instance::from_json).collect())
            }
            Value::Object(map) => Instance::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, Instance::from_json(value)))
                    .collect(),
            ),
            scalar => Instance::Scalar(scalar),
        }
    }

    /// Plain JSON view, keyed by logical field names.
    pub fn to_json(&self) -> Value {
        match self {
            Instance::Scalar(value) => value.clone(),
            Instance::Sequence(items) => Value::Array(items.iter().map(Instance::to_json).collect()),
            Instance::Mapping(entries) | Instance::Record(Record { fields: entries, .. }) => {
                let map: Map<String, Value> = entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect();
                Value::Object(map)
            }
        }
    }

    /// Convert into any deserializable type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }

    pub fn record_name(&self) -> Option<&str> {
        match self {
            Instance::Record(record) => Some(record.type_name()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Instance::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Instance::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Record field or mapping entry.
    pub fn get(&self, key: &str) -> Option<&Instance> {
        match self {
            Instance::Record(record) => record.get(key),
            Instance::Mapping(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn index(&self, index: usize) -> Option<&Instance> {
        match self {
            Instance::Sequence(items) => items.get(index),
            _ => None,
        }
    }
}

impl From<Value> for Instance {
    fn from(value: Value) -> Self {
        Instance::from_json(value)
    }
}

impl PartialEq<Value> for Instance {
    fn eq(&self, other: &Value) -> bool {
        &self.to_json() == other
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Instance::Scalar(value) => value.serialize(serializer),
            Instance::Sequence(items) => serializer.collect_seq(items),
            Instance::Mapping(entries) | Instance::Record(Record { fields: entries, .. }) => {
                serializer.collect_map(entries.iter().map(|(key, value)| (key, value)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn question() -> Instance {
        Instance::Record(Record::new(
            "Question",
            vec![
                ("question".into(), Instance::Scalar(json!("Which one?"))),
                (
                    "options".into(),
                    Instance::Sequence(vec![
                        Instance::Scalar(json!("a")),
                        Instance::Scalar(json!("b")),
                    ]),
                ),
            ],
        ))
    }

    #[test]
    fn to_json_uses_field_names_in_order() {
        let json = question().to_json();
        assert_eq!(json, json!({ "question": "Which one?", "options": ["a", "b"] }));
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["question", "options"]);
    }

    #[test]
    fn serializes_like_to_json() {
        let text = serde_json::to_string(&question()).unwrap();
        assert_eq!(text, r#"{"question":"Which one?","options":["a","b"]}"#);
    }

    #[test]
    fn deserializes_into_typed_struct() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Question {
            question: String,
            options: Vec<String>,
        }
        let q: Question = question().deserialize().unwrap();
        assert_eq!(q.options, vec!["a", "b"]);
    }

    #[test]
    fn accessors() {
        let q = question();
        assert_eq!(q.record_name(), Some("Question"));
        assert_eq!(q.get("options").and_then(|o| o.index(1)), Some(&Instance::Scalar(json!("b"))));
        assert!(q.get("missing").is_none());
        assert_eq!(Instance::from_json(json!({ "k": [1] })).get("k").unwrap(), &json!([1]));
    }
}
