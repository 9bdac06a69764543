use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

/// Violations reported per rejected call.
const MAX_REPORTED: usize = 4;

/// A method's descriptor together with its compiled validator.
pub(crate) struct MethodSchema {
    pub method: String,
    pub descriptor: Value,
    validator: Validator,
}

impl MethodSchema {
    /// Compile `descriptor`. With `closed`, object schemas reject undeclared
    /// properties; the stored descriptor is left as given.
    pub fn compile(method: &str, descriptor: &Value, closed: bool) -> Result<Self> {
        let compiled = if closed {
            let mut copy = descriptor.clone();
            close_objects(&mut copy);
            jsonschema::validator_for(&copy)
        } else {
            jsonschema::validator_for(descriptor)
        };
        let validator = compiled.map_err(|err| SchemaError::CompileFailed {
            method: method.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            method: method.to_string(),
            descriptor: descriptor.clone(),
            validator,
        })
    }

    pub fn check(&self, args: &Value) -> Result<()> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(args)
            .take(MAX_REPORTED)
            .map(|err| err.to_string())
            .collect();
        if violations.is_empty() {
            return Ok(());
        }
        Err(SchemaError::ValidationFailed {
            method: self.method.clone(),
            message: violations.join("; "),
        })
    }
}

/// Add `"additionalProperties": false` to every object schema that does not
/// say otherwise.
fn close_objects(schema: &mut Value) {
    match schema {
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        Value::Object(map) => {
            if describes_object(map) {
                map.entry("additionalProperties")
                    .or_insert(Value::Bool(false));
            }
            for (keyword, child) in map.iter_mut() {
                match keyword.as_str() {
                    // Instance data, not subschemas.
                    "enum" | "const" | "default" | "examples" | "required" => {}
                    // Maps of name -> subschema.
                    "properties" | "patternProperties" | "dependentSchemas" | "$defs"
                    | "definitions" => {
                        if let Value::Object(named) = child {
                            named.values_mut().for_each(close_objects);
                        }
                    }
                    _ => close_objects(child),
                }
            }
        }
        _ => {}
    }
}

fn describes_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        Some(_) => false,
        None => ["properties", "patternProperties", "required", "propertyNames"]
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}
