//! Construction of validated instances from raw decoded values.
//!
//! The default [`SchemaMaterializer`] exports the declared type as a JSON Schema,
//! validates the raw value with `jsonschema`, then shapes it into an [`Instance`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ConstructionError, Violation};
use crate::instance::{Instance, Record};
use crate::schema::{Schema, TypeRef};

/// Turns a fully decoded raw value plus a type into a concrete instance.
pub trait Materializer {
    /// Validate `raw` against `type_ref` and construct the instance.
    ///
    /// # Errors
    ///
    /// Returns `ConstructionError` when the value does not fit the type.
    fn construct(
        &self,
        schema: &Schema,
        type_ref: &TypeRef,
        raw: Value,
    ) -> Result<Instance, ConstructionError>;

    /// Shape a field default, which is trusted to already fit its type.
    fn echo(&self, schema: &Schema, type_ref: &TypeRef, value: Value) -> Instance {
        let _ = (schema, type_ref);
        Instance::from_json(value)
    }
}

/// Default materializer: `jsonschema` validation plus schema-driven shaping.
///
/// Compiled validators are cached per type for the lifetime of the materializer.
#[derive(Default)]
pub struct SchemaMaterializer {
    validators: RefCell<HashMap<TypeRef, Rc<jsonschema::Validator>>>,
}

impl SchemaMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn validator(
        &self,
        schema: &Schema,
        type_ref: &TypeRef,
    ) -> Result<Rc<jsonschema::Validator>, ConstructionError> {
        if let Some(validator) = self.validators.borrow().get(type_ref) {
            return Ok(Rc::clone(validator));
        }
        let document = schema.json_schema_for(type_ref);
        let validator = jsonschema::validator_for(&document).map_err(|e| {
            ConstructionError::InvalidDescriptor {
                type_ref: type_ref.to_string(),
                message: e.to_string(),
            }
        })?;
        let validator = Rc::new(validator);
        self.validators
            .borrow_mut()
            .insert(type_ref.clone(), Rc::clone(&validator));
        Ok(validator)
    }

    fn accepts(&self, schema: &Schema, type_ref: &TypeRef, raw: &Value) -> Result<bool, ConstructionError> {
        Ok(self.validator(schema, type_ref)?.is_valid(raw))
    }

    /// Shape `raw` by `type_ref`. Values that do not match the expected shape are
    /// kept untyped; validation has already rejected them when it matters.
    fn shape(&self, schema: &Schema, type_ref: &TypeRef, raw: Value) -> Result<Instance, ConstructionError> {
        match (type_ref, raw) {
            (TypeRef::Record(name), Value::Object(mut map)) => {
                let Some(record) = schema.record(name) else {
                    return Ok(Instance::from_json(Value::Object(map)));
                };
                let mut fields = Vec::new();
                for (field, wire, descriptor) in record.wire_fields() {
                    let value = match map.remove(wire) {
                        Some(value) => value,
                        None => match descriptor.produce_default() {
                            Some(default) => default,
                            None => continue,
                        },
                    };
                    fields.push((field.to_string(), self.shape(schema, descriptor.type_ref(), value)?));
                }
                Ok(Instance::Record(Record::new(name.clone(), fields)))
            }
            (TypeRef::Sequence(item), Value::Array(items)) => items
                .into_iter()
                .map(|value| self.shape(schema, item, value))
                .collect::<Result<Vec<_>, _>>()
                .map(Instance::Sequence),
            (TypeRef::Mapping(value_type), Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| Ok((key, self.shape(schema, value_type, value)?)))
                .collect::<Result<Vec<_>, ConstructionError>>()
                .map(Instance::Mapping),
            (TypeRef::Union(members), raw) => {
                let mut chosen: Option<(&TypeRef, usize)> = None;
                for member in members {
                    if !self.accepts(schema, member, &raw)? {
                        continue;
                    }
                    let coverage = key_coverage(schema, member, &raw);
                    if chosen.map_or(true, |(_, best)| coverage > best) {
                        chosen = Some((member, coverage));
                    }
                }
                match chosen {
                    Some((member, _)) => self.shape(schema, member, raw),
                    None => Ok(Instance::from_json(raw)),
                }
            }
            (_, raw) => Ok(Instance::from_json(raw)),
        }
    }
}

/// Number of declared wire keys of `type_ref` present in the raw object.
///
/// Ties between accepting union members go to the earlier member.
fn key_coverage(schema: &Schema, type_ref: &TypeRef, raw: &Value) -> usize {
    let Value::Object(map) = raw else {
        return 0;
    };
    match type_ref {
        TypeRef::Record(name) => schema.record(name).map_or(0, |record| {
            record
                .wire_fields()
                .filter(|(_, wire, _)| map.contains_key(*wire))
                .count()
        }),
        TypeRef::Union(members) => members
            .iter()
            .map(|member| key_coverage(schema, member, raw))
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

impl Materializer for SchemaMaterializer {
    fn construct(
        &self,
        schema: &Schema,
        type_ref: &TypeRef,
        raw: Value,
    ) -> Result<Instance, ConstructionError> {
        let validator = self.validator(schema, type_ref)?;
        let violations: Vec<Violation> = validator
            .iter_errors(&raw)
            .map(|e| Violation {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        if !violations.is_empty() {
            return Err(ConstructionError::Invalid { violations });
        }
        self.shape(schema, type_ref, raw)
    }

    fn echo(&self, schema: &Schema, type_ref: &TypeRef, value: Value) -> Instance {
        match self.shape(schema, type_ref, value.clone()) {
            Ok(instance) => instance,
            Err(_) => Instance::from_json(value),
        }
    }
}
