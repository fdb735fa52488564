//! Schema declaration and field resolution.
//!
//! A [`Schema`] is a read-only registry of record shapes, built once and then shared
//! by every traversal. Field resolution is a pure lookup against it: no I/O and no
//! knowledge of where the stream currently is.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::{LookupError, SchemaError};
use crate::path::PathKey;

/// JSON Schema dialect used for exported schemas.
pub const JSON_SCHEMA_DRAFT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Leaf value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    /// Any JSON value; accepts every key and index.
    Any,
}

impl ScalarKind {
    /// Keyword used in type expressions.
    pub fn keyword(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Number => "number",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Null => "null",
            ScalarKind::Any => "any",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ScalarKind::String),
            "integer" => Some(ScalarKind::Integer),
            "number" => Some(ScalarKind::Number),
            "boolean" => Some(ScalarKind::Boolean),
            "null" => Some(ScalarKind::Null),
            "any" => Some(ScalarKind::Any),
            _ => None,
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            ScalarKind::Any => json!({}),
            kind => json!({ "type": kind.keyword() }),
        }
    }
}

/// The declared type of a field or element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Scalar(ScalarKind),
    /// Reference to a record declared in the [`Schema`].
    Record(String),
    Sequence(Box<TypeRef>),
    /// String-keyed mapping; only the value type is declared.
    Mapping(Box<TypeRef>),
    Union(Vec<TypeRef>),
}

impl TypeRef {
    pub fn string() -> Self {
        TypeRef::Scalar(ScalarKind::String)
    }

    pub fn integer() -> Self {
        TypeRef::Scalar(ScalarKind::Integer)
    }

    pub fn number() -> Self {
        TypeRef::Scalar(ScalarKind::Number)
    }

    pub fn boolean() -> Self {
        TypeRef::Scalar(ScalarKind::Boolean)
    }

    pub fn null() -> Self {
        TypeRef::Scalar(ScalarKind::Null)
    }

    pub fn any() -> Self {
        TypeRef::Scalar(ScalarKind::Any)
    }

    pub fn record(name: impl Into<String>) -> Self {
        TypeRef::Record(name.into())
    }

    pub fn sequence(item: TypeRef) -> Self {
        TypeRef::Sequence(Box::new(item))
    }

    pub fn mapping(value: TypeRef) -> Self {
        TypeRef::Mapping(Box::new(value))
    }

    /// Build a union, flattening nested unions and dropping duplicate members.
    ///
    /// A union of one member is that member.
    pub fn union(members: impl IntoIterator<Item = TypeRef>) -> Self {
        let mut flat: Vec<TypeRef> = Vec::new();
        for member in members {
            let nested = match member {
                TypeRef::Union(inner) => inner,
                other => vec![other],
            };
            for ty in nested {
                if !flat.contains(&ty) {
                    flat.push(ty);
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            TypeRef::Union(flat)
        }
    }

    /// `union<inner, null>`.
    pub fn optional(inner: TypeRef) -> Self {
        TypeRef::union([inner, TypeRef::null()])
    }

    /// True if an integer key can be applied to a value of this type.
    pub fn is_sequence_capable(&self) -> bool {
        match self {
            TypeRef::Sequence(_) | TypeRef::Scalar(ScalarKind::Any) => true,
            TypeRef::Union(members) => members.iter().any(TypeRef::is_sequence_capable),
            _ => false,
        }
    }

    /// JSON Schema fragment for this type. Records are `$ref`s into `#/$defs`.
    pub fn json_schema(&self) -> Value {
        match self {
            TypeRef::Scalar(kind) => kind.json_schema(),
            TypeRef::Record(name) => json!({ "$ref": format!("#/$defs/{}", name) }),
            TypeRef::Sequence(item) => json!({ "type": "array", "items": item.json_schema() }),
            TypeRef::Mapping(value) => {
                json!({ "type": "object", "additionalProperties": value.json_schema() })
            }
            TypeRef::Union(members) => {
                let any_of: Vec<Value> = members.iter().map(TypeRef::json_schema).collect();
                json!({ "anyOf": any_of })
            }
        }
    }

    fn visit_records<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeRef::Scalar(_) => {}
            TypeRef::Record(name) => out.push(name),
            TypeRef::Sequence(inner) | TypeRef::Mapping(inner) => inner.visit_records(out),
            TypeRef::Union(members) => {
                for member in members {
                    member.visit_records(out);
                }
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Scalar(kind) => f.write_str(kind.keyword()),
            TypeRef::Record(name) => f.write_str(name),
            TypeRef::Sequence(item) => write!(f, "sequence<{}>", item),
            TypeRef::Mapping(value) => write!(f, "mapping<{}>", value),
            TypeRef::Union(members) => {
                if let [inner, TypeRef::Scalar(ScalarKind::Null)] = members.as_slice() {
                    return write!(f, "optional<{}>", inner);
                }
                f.write_str("union<")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                f.write_str(">")
            }
        }
    }
}

impl FromStr for TypeRef {
    type Err = SchemaError;

    /// Parse a type expression such as `sequence<union<A, B>>` or `optional<string>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser { src: s, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn error(&self, message: &str) -> SchemaError {
        SchemaError::InvalidType {
            expr: self.src.to_string(),
            message: format!("{} at offset {}", message, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn ident(&mut self) -> Result<&'a str, SchemaError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            self.pos += c.len_utf8();
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        Ok(&self.src[start..self.pos])
    }

    fn args(&mut self) -> Result<Vec<TypeRef>, SchemaError> {
        self.skip_whitespace();
        if self.peek() != Some('<') {
            return Ok(Vec::new());
        }
        self.pos += 1;
        let mut args = vec![self.parse_type()?];
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    args.push(self.parse_type()?);
                }
                Some('>') => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.error("expected ',' or '>'")),
            }
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef, SchemaError> {
        let name = self.ident()?;
        let mut args = self.args()?;
        if let Some(kind) = ScalarKind::from_keyword(name) {
            if !args.is_empty() {
                return Err(self.error("scalar types take no arguments"));
            }
            return Ok(TypeRef::Scalar(kind));
        }
        match (name, args.len()) {
            ("sequence", 1) => Ok(TypeRef::sequence(args.remove(0))),
            ("optional", 1) => Ok(TypeRef::optional(args.remove(0))),
            ("mapping", 1) => Ok(TypeRef::mapping(args.remove(0))),
            // mapping<string, V>: keys are always strings on the wire
            ("mapping", 2) if args[0] == TypeRef::string() => Ok(TypeRef::mapping(args.remove(1))),
            ("mapping", 2) => Err(self.error("mapping keys must be strings")),
            ("union", n) if n > 0 => Ok(TypeRef::union(args)),
            ("sequence" | "optional" | "mapping" | "union", _) => {
                Err(self.error(&format!("wrong number of arguments for {}", name)))
            }
            (_, 0) => Ok(TypeRef::Record(name.to_string())),
            _ => Err(self.error("record types take no arguments")),
        }
    }
}

/// Value used when a field is absent from the document.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// Evaluate the default, calling the factory if there is one.
    pub fn produce(&self) -> Value {
        match self {
            FieldDefault::Value(value) => value.clone(),
            FieldDefault::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Describes one reachable field or element: its type, wire alias and default.
///
/// A descriptor without a default denotes a required field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    type_ref: TypeRef,
    wire_alias: Option<String>,
    default: Option<FieldDefault>,
}

impl FieldDescriptor {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            wire_alias: None,
            default: None,
        }
    }

    /// Name used for this field in the wire document.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.wire_alias = Some(alias.into());
        self
    }

    /// Fixed default. Replaces any default factory.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(FieldDefault::Value(value));
        self
    }

    /// Default computed on demand. Replaces any fixed default.
    pub fn default_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(FieldDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn wire_alias(&self) -> Option<&str> {
        self.wire_alias.as_deref()
    }

    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn produce_default(&self) -> Option<Value> {
        self.default.as_ref().map(FieldDefault::produce)
    }

    /// The key to use against the stream: the alias if declared, else the logical key.
    pub fn wire_key(&self, key: &PathKey) -> PathKey {
        match (key, &self.wire_alias) {
            (PathKey::Field(_), Some(alias)) => PathKey::Field(alias.clone()),
            _ => key.clone(),
        }
    }
}

/// A declared record: named fields in declaration order.
#[derive(Debug, Clone)]
pub struct RecordShape {
    name: String,
    fields: Vec<(String, FieldDescriptor)>,
}

impl RecordShape {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(name, d)| (name.as_str(), d))
    }

    fn wire_name<'a>(name: &'a str, descriptor: &'a FieldDescriptor) -> &'a str {
        descriptor.wire_alias().unwrap_or(name)
    }

    /// Wire key paired with each logical field name.
    pub fn wire_fields(&self) -> impl Iterator<Item = (&str, &str, &FieldDescriptor)> {
        self.fields
            .iter()
            .map(|(name, d)| (name.as_str(), Self::wire_name(name, d), d))
    }

    fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (_, wire, descriptor) in self.wire_fields() {
            properties.insert(wire.to_string(), descriptor.type_ref().json_schema());
            if !descriptor.has_default() {
                required.push(Value::String(wire.to_string()));
            }
        }
        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        Value::Object(schema)
    }
}

/// Builder for one record, used through [`SchemaBuilder::record`].
#[derive(Debug)]
pub struct RecordBuilder {
    shape: RecordShape,
}

impl RecordBuilder {
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.shape.fields.push((name.into(), descriptor));
        self
    }
}

/// Collects record declarations; [`build`](SchemaBuilder::build) checks them.
#[derive(Debug)]
pub struct SchemaBuilder {
    root: String,
    records: Vec<RecordShape>,
}

impl SchemaBuilder {
    pub fn record(
        mut self,
        name: impl Into<String>,
        declare: impl FnOnce(RecordBuilder) -> RecordBuilder,
    ) -> Self {
        let builder = RecordBuilder {
            shape: RecordShape {
                name: name.into(),
                fields: Vec::new(),
            },
        };
        self.records.push(declare(builder).shape);
        self
    }

    /// Add an already assembled record.
    pub fn with_record(mut self, name: impl Into<String>, fields: Vec<(String, FieldDescriptor)>) -> Self {
        self.records.push(RecordShape {
            name: name.into(),
            fields,
        });
        self
    }

    /// Validate the declarations and freeze them into a [`Schema`].
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for an undeclared root or referenced record, duplicate
    /// records or fields, or two fields sharing a wire key.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut records = HashMap::new();
        let mut order = Vec::new();
        for shape in self.records {
            let mut names = HashSet::new();
            let mut wire_keys = HashSet::new();
            for (name, wire, _) in shape.wire_fields() {
                if !names.insert(name) {
                    return Err(SchemaError::DuplicateField {
                        record: shape.name.clone(),
                        field: name.to_string(),
                    });
                }
                if !wire_keys.insert(wire) {
                    return Err(SchemaError::DuplicateWireKey {
                        record: shape.name.clone(),
                        wire_key: wire.to_string(),
                    });
                }
            }
            if records.contains_key(&shape.name) {
                return Err(SchemaError::DuplicateRecord { record: shape.name });
            }
            order.push(shape.name.clone());
            records.insert(shape.name.clone(), shape);
        }

        if !records.contains_key(&self.root) {
            return Err(SchemaError::UnknownRoot { root: self.root });
        }

        for name in &order {
            let shape = &records[name];
            for (field, descriptor) in shape.fields() {
                let mut referenced = Vec::new();
                descriptor.type_ref().visit_records(&mut referenced);
                if let Some(missing) = referenced.into_iter().find(|r| !records.contains_key(*r)) {
                    return Err(SchemaError::UnknownRecord {
                        record: missing.to_string(),
                        referenced_by: format!("{}.{}", name, field),
                    });
                }
            }
        }

        Ok(Schema {
            root: self.root,
            records,
            order,
        })
    }
}

/// Read-only registry of declared records plus the root record name.
#[derive(Debug, Clone)]
pub struct Schema {
    root: String,
    records: HashMap<String, RecordShape>,
    order: Vec<String>,
}

impl Schema {
    pub fn builder(root: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            root: root.into(),
            records: Vec::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_type(&self) -> TypeRef {
        TypeRef::Record(self.root.clone())
    }

    pub fn record(&self, name: &str) -> Option<&RecordShape> {
        self.records.get(name)
    }

    /// Records in declaration order.
    pub fn records(&self) -> impl Iterator<Item = &RecordShape> {
        self.order.iter().filter_map(|name| self.records.get(name))
    }

    /// Map `key` onto the schema below `context`.
    ///
    /// `context` is the descriptor of the node being accessed, `None` for the
    /// document root.
    ///
    /// # Errors
    ///
    /// `LookupError::NotSequence` for an integer key where no sequence-capable shape
    /// is declared, `LookupError::UnknownField` for a string key with no record,
    /// mapping or union interpretation.
    pub fn resolve_field(
        &self,
        context: Option<&FieldDescriptor>,
        key: &PathKey,
    ) -> Result<FieldDescriptor, LookupError> {
        match context {
            None => self.lookup(&self.root_type(), key),
            Some(descriptor) => self.lookup(descriptor.type_ref(), key),
        }
    }

    fn lookup(&self, ty: &TypeRef, key: &PathKey) -> Result<FieldDescriptor, LookupError> {
        match (ty, key) {
            (TypeRef::Record(name), PathKey::Field(field)) => self
                .record(name)
                .and_then(|record| record.field(field))
                .cloned()
                .ok_or_else(|| LookupError::UnknownField(field.clone())),
            (TypeRef::Mapping(value), PathKey::Field(_)) => {
                Ok(FieldDescriptor::new((**value).clone()))
            }
            (TypeRef::Sequence(item), PathKey::Index(_)) => {
                Ok(FieldDescriptor::new((**item).clone()))
            }
            (TypeRef::Scalar(ScalarKind::Any), _) => Ok(FieldDescriptor::new(TypeRef::any())),
            (TypeRef::Union(members), PathKey::Index(_)) => {
                let items: Vec<TypeRef> = members
                    .iter()
                    .filter_map(|member| match member {
                        TypeRef::Sequence(item) => Some((**item).clone()),
                        TypeRef::Scalar(ScalarKind::Any) => Some(TypeRef::any()),
                        _ => None,
                    })
                    .collect();
                if items.is_empty() {
                    return Err(LookupError::NotSequence);
                }
                Ok(FieldDescriptor::new(TypeRef::union(items)))
            }
            (TypeRef::Union(members), PathKey::Field(field)) => members
                .iter()
                .find_map(|member| match member {
                    TypeRef::Record(name) => self.record(name)?.field(field).cloned(),
                    _ => None,
                })
                .or_else(|| {
                    members.iter().find_map(|member| match member {
                        TypeRef::Mapping(value) => Some(FieldDescriptor::new((**value).clone())),
                        TypeRef::Scalar(ScalarKind::Any) => Some(FieldDescriptor::new(TypeRef::any())),
                        _ => None,
                    })
                })
                .ok_or_else(|| LookupError::UnknownField(field.clone())),
            (_, PathKey::Index(_)) => Err(LookupError::NotSequence),
            (_, PathKey::Field(field)) => Err(LookupError::UnknownField(field.clone())),
        }
    }

    /// Standalone JSON Schema for the root record.
    pub fn json_schema(&self) -> Value {
        self.json_schema_for(&self.root_type())
    }

    /// Standalone JSON Schema for `ty`, with every declared record under `$defs`.
    pub fn json_schema_for(&self, ty: &TypeRef) -> Value {
        let mut document = Map::new();
        document.insert("$schema".into(), json!(JSON_SCHEMA_DRAFT));
        if let Value::Object(fragment) = ty.json_schema() {
            document.extend(fragment);
        }
        let defs: Map<String, Value> = self
            .records()
            .map(|record| (record.name.clone(), record.json_schema()))
            .collect();
        document.insert("$defs".into(), Value::Object(defs));
        Value::Object(document)
    }
}
