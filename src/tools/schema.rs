//! JSON Schema compilation and argument validation.
//!
//! Tool schemas are portable JSON Schema documents; any conformant validator
//! works. We compile them once per manifest refresh and keep the compiled form
//! next to the catalog entry.

use serde_json::{json, Map, Value};
use std::fmt;

/// Top-level keywords that mark a document as a full JSON Schema rather than
/// the compact `{"field": {<schema>}}` property-map shorthand.
const SCHEMA_KEYWORDS: &[&str] = &[
    "type",
    "properties",
    "required",
    "$schema",
    "$ref",
    "$id",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "enum",
    "const",
    "items",
    "additionalProperties",
    "patternProperties",
];

/// A schema document together with its compiled validator.
pub struct CompiledSchema {
    source: Value,
    validator: jsonschema::Validator,
}

impl CompiledSchema {
    /// Compile a schema document as-is.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Self {
            source: schema.clone(),
            validator,
        })
    }

    /// Compile an argsSchema, expanding the property-map shorthand first.
    pub fn compile_args(schema: &Value) -> Result<Self, String> {
        Self::compile(&normalize_args_schema(schema))
    }

    /// Every violation as `"<instance path>: <message>"`. Empty means valid.
    pub fn errors(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|err| {
                let path = err.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{}: {}", path, err)
            })
            .collect()
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Expand the compact property-map form into an object schema.
///
/// `{"ticker": {"type": "string"}}` becomes
/// `{"type": "object", "properties": {...}, "required": ["ticker"]}`.
/// Anything that already looks like a JSON Schema is returned unchanged.
pub fn normalize_args_schema(schema: &Value) -> Value {
    let Some(map) = schema.as_object() else {
        return schema.clone();
    };
    if map.is_empty() || !is_property_map(map) {
        return schema.clone();
    }
    let required: Vec<&String> = map.keys().collect();
    json!({
        "type": "object",
        "properties": map,
        "required": required,
    })
}

fn is_property_map(map: &Map<String, Value>) -> bool {
    map.keys().all(|k| !SCHEMA_KEYWORDS.contains(&k.as_str()))
        && map.values().all(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_is_expanded() {
        let schema = normalize_args_schema(&json!({"ticker": {"type": "string"}}));
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["ticker"]));
        assert_eq!(schema["properties"]["ticker"]["type"], "string");
    }

    #[test]
    fn test_full_schema_untouched() {
        let full = json!({
            "type": "object",
            "properties": {"host": {"type": "string"}},
        });
        assert_eq!(normalize_args_schema(&full), full);
        assert_eq!(normalize_args_schema(&json!({})), json!({}));
    }

    #[test]
    fn test_shorthand_rejects_empty_args() {
        let compiled = CompiledSchema::compile_args(&json!({"ticker": {"type": "string"}})).unwrap();
        let errors = compiled.errors(&json!({}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("ticker"), "got {:?}", errors);
        assert!(compiled.is_valid(&json!({"ticker": "ACME"})));
    }

    #[test]
    fn test_error_paths_point_at_field() {
        let compiled = CompiledSchema::compile(&json!({
            "type": "object",
            "properties": {"port": {"type": "integer"}},
        }))
        .unwrap();
        let errors = compiled.errors(&json!({"port": "eighty"}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("/port: "), "got {:?}", errors);
    }

    #[test]
    fn test_invalid_schema_fails_to_compile() {
        assert!(CompiledSchema::compile(&json!({"type": "no-such-type"})).is_err());
    }
}
