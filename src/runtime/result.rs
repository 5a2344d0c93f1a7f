//! Normalized result envelope.
//!
//! Every plugin's output is folded into the same `{graph_entities,
//! search_documents}` shape before it reaches a job or the ingestion sink.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GraphEntity {
    /// `type:id`, the entity part of an ingestion natural key.
    pub fn natural_key(&self) -> String {
        format!("{}:{}", self.entity_type, self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub graph_entities: Vec<GraphEntity>,
    #[serde(default)]
    pub search_documents: Vec<Value>,
}

impl ExecutionResult {
    pub fn is_empty(&self) -> bool {
        self.graph_entities.is_empty() && self.search_documents.is_empty()
    }
}

/// Fold raw tool output into an [`ExecutionResult`].
///
/// Accepted shapes:
/// - `{graph_entities, search_documents}` (or the aliases `entities`, `documents`)
/// - a bare array of entities
/// - anything else, wrapped as one search document `{plugin, tool, content}`
pub fn normalize_output(plugin: &str, tool: &str, output: Value) -> Result<ExecutionResult, String> {
    match output {
        Value::Object(mut map) if is_envelope(&map) => {
            let entities = take_list(&mut map, "graph_entities", "entities")?;
            let documents = take_list(&mut map, "search_documents", "documents")?;
            Ok(ExecutionResult {
                graph_entities: entities
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| entity_from_value(v).map_err(|e| format!("entity {}: {}", i, e)))
                    .collect::<Result<_, _>>()?,
                search_documents: documents,
            })
        }
        Value::Array(items) => Ok(ExecutionResult {
            graph_entities: items
                .into_iter()
                .enumerate()
                .map(|(i, v)| entity_from_value(v).map_err(|e| format!("entity {}: {}", i, e)))
                .collect::<Result<_, _>>()?,
            search_documents: Vec::new(),
        }),
        other => Ok(ExecutionResult {
            graph_entities: Vec::new(),
            search_documents: vec![json!({
                "plugin": plugin,
                "tool": tool,
                "content": other,
            })],
        }),
    }
}

fn is_envelope(map: &Map<String, Value>) -> bool {
    ["graph_entities", "search_documents", "entities", "documents"]
        .iter()
        .any(|k| map.contains_key(*k))
}

fn take_list(map: &mut Map<String, Value>, key: &str, alias: &str) -> Result<Vec<Value>, String> {
    match map.remove(key).or_else(|| map.remove(alias)) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(format!("'{}' must be an array", key)),
    }
}

fn entity_from_value(value: Value) -> Result<GraphEntity, String> {
    let Value::Object(mut map) = value else {
        return Err("must be an object".to_string());
    };
    let entity_type = match map.remove("type").or_else(|| map.remove("kind")) {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return Err("missing 'type'".to_string()),
    };
    let id = match map.remove("id") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err("missing 'id'".to_string()),
    };
    let properties = match map.remove("properties") {
        Some(Value::Object(props)) => props,
        _ => map,
    };
    Ok(GraphEntity {
        entity_type,
        id,
        properties,
    })
}
