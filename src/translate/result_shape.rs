//! Folds returned rows back into the nested shape the caller asked for.
//!
//! The statement projects exactly the requested data; this module renames
//! nothing it does not have to. It fills `__typename`, resolves union
//! members from `__resolveType`, computes connection cursors and `pageInfo`,
//! and builds mutation payloads from the engine's update counters.

use serde_json::{Map, Value};

use super::projection::EDGE_NODE_KEY;
use super::OperationKind;
use crate::errors::TranslationError;
use crate::execution::{ExecutionOutput, UpdateStatistics};
use crate::selection::cursor::offset_to_cursor;
use crate::selection::{
    ConnectionField, ConnectionSelection, EdgeField, FieldKind, InfoField, NodeSelection,
    PageInfoField, PayloadField, RelationshipSelection,
};

const RESOLVE_TYPE: &str = "__resolveType";

/// Column holding the read-back list of a create or update.
pub const MUTATION_COLUMN: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    /// One row per root node under `column`
    Nodes { column: String, selection: NodeSelection },
    Mutation {
        operation: OperationKind,
        type_name: String,
        plural: String,
        payload: Vec<PayloadField>,
    },
}

impl ResultShape {
    pub fn fold(&self, output: &ExecutionOutput) -> Result<Value, TranslationError> {
        match self {
            ResultShape::Nodes { column, selection } => {
                let mut nodes = Vec::with_capacity(output.rows.len());
                for row in &output.rows {
                    let value = row.get(column).ok_or_else(|| missing_column(column))?;
                    nodes.push(shape_node(selection, value));
                }
                Ok(Value::Array(nodes))
            }
            ResultShape::Mutation {
                operation,
                type_name,
                plural,
                payload,
            } => {
                let written = match output.rows.first() {
                    Some(row) => row.get(MUTATION_COLUMN).cloned().unwrap_or(Value::Null),
                    None => Value::Null,
                };
                let written = match written {
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                Ok(Value::Object(shape_payload(
                    *operation,
                    type_name,
                    plural,
                    payload,
                    &written,
                    &output.stats,
                )))
            }
        }
    }
}

fn missing_column(column: &str) -> TranslationError {
    TranslationError::Execution(format!("Result row has no `{}` column", column))
}

fn shape_node(selection: &NodeSelection, value: &Value) -> Value {
    let map = match value {
        Value::Object(map) => map,
        _ => return Value::Null,
    };
    let mut shaped = Map::new();
    for field in &selection.fields {
        let key = &field.response_key;
        let value = match &field.kind {
            FieldKind::Typename => map
                .get(RESOLVE_TYPE)
                .cloned()
                .unwrap_or_else(|| Value::String(selection.type_name.clone())),
            FieldKind::Property(_) => map.get(key).cloned().unwrap_or(Value::Null),
            FieldKind::Relationship(related) => shape_related(related, map.get(key)),
            FieldKind::Connection(connection) => {
                shape_connection(&selection.type_name, connection, map.get(key))
            }
        };
        shaped.insert(key.clone(), value);
    }
    Value::Object(shaped)
}

fn shape_related(related: &RelationshipSelection, value: Option<&Value>) -> Value {
    let pick = |item: &Value| {
        let branch = if related.union {
            let member = item.get(RESOLVE_TYPE).and_then(Value::as_str);
            related
                .branches
                .iter()
                .find(|b| Some(b.selection.type_name.as_str()) == member)
        } else {
            related.branches.first()
        };
        match branch {
            Some(branch) => shape_node(&branch.selection, item),
            None => Value::Null,
        }
    };
    match value {
        Some(Value::Array(items)) if related.list => Value::Array(items.iter().map(pick).collect()),
        Some(Value::Array(items)) => items.first().map(pick).unwrap_or(Value::Null),
        Some(item @ Value::Object(_)) if !related.list => pick(item),
        _ if related.list => Value::Array(Vec::new()),
        _ => Value::Null,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn shape_connection(owner: &str, connection: &ConnectionSelection, value: Option<&Value>) -> Value {
    let empty = Vec::new();
    let edges = value
        .and_then(|v| v.get("edges"))
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let total = value
        .and_then(|v| v.get("totalCount"))
        .and_then(Value::as_u64)
        .unwrap_or(connection.offset.saturating_add(edges.len() as u64));
    let offset = connection.offset;
    let count = edges.len() as u64;
    let base = format!("{}{}", owner, capitalize(&connection.field));

    let mut shaped = Map::new();
    for field in &connection.fields {
        match field {
            ConnectionField::Typename { key } => {
                shaped.insert(key.clone(), Value::String(format!("{}Connection", base)));
            }
            ConnectionField::TotalCount { key } => {
                shaped.insert(key.clone(), Value::from(total));
            }
            ConnectionField::Edges { key, fields } => {
                let items = edges
                    .iter()
                    .enumerate()
                    .map(|(index, edge)| {
                        let mut item = Map::new();
                        for edge_field in fields {
                            match edge_field {
                                EdgeField::Typename { key } => {
                                    item.insert(key.clone(), Value::String(format!("{}Relationship", base)));
                                }
                                EdgeField::Cursor { key } => {
                                    item.insert(key.clone(), Value::String(offset_to_cursor(offset.saturating_add(index as u64))));
                                }
                                EdgeField::Node { key, selection } => {
                                    let node = edge.get(EDGE_NODE_KEY).unwrap_or(&Value::Null);
                                    item.insert(key.clone(), shape_node(selection, node));
                                }
                                EdgeField::Property { key, name } => {
                                    item.insert(key.clone(), edge.get(name).cloned().unwrap_or(Value::Null));
                                }
                            }
                        }
                        Value::Object(item)
                    })
                    .collect();
                shaped.insert(key.clone(), Value::Array(items));
            }
            ConnectionField::PageInfo { key, fields } => {
                let mut info = Map::new();
                for (name, field) in fields {
                    let value = match field {
                        PageInfoField::Typename => Value::String("PageInfo".to_string()),
                        PageInfoField::HasNextPage => Value::Bool(offset.saturating_add(count) < total),
                        PageInfoField::HasPreviousPage => Value::Bool(offset > 0),
                        PageInfoField::StartCursor if count > 0 => Value::String(offset_to_cursor(offset)),
                        PageInfoField::EndCursor if count > 0 => {
                            Value::String(offset_to_cursor(offset.saturating_add(count - 1)))
                        }
                        PageInfoField::StartCursor | PageInfoField::EndCursor => Value::Null,
                    };
                    info.insert(name.clone(), value);
                }
                shaped.insert(key.clone(), Value::Object(info));
            }
        }
    }
    Value::Object(shaped)
}

fn operation_prefix(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Read => "Read",
        OperationKind::Create => "Create",
        OperationKind::Update => "Update",
        OperationKind::Delete => "Delete",
    }
}

fn counter(stats: &UpdateStatistics, field: InfoField) -> Option<Value> {
    match field {
        InfoField::Typename => None,
        InfoField::NodesCreated => Some(Value::from(stats.nodes_created)),
        InfoField::NodesDeleted => Some(Value::from(stats.nodes_deleted)),
        InfoField::RelationshipsCreated => Some(Value::from(stats.relationships_created)),
        InfoField::RelationshipsDeleted => Some(Value::from(stats.relationships_deleted)),
    }
}

fn shape_payload(
    operation: OperationKind,
    type_name: &str,
    plural: &str,
    payload: &[PayloadField],
    written: &[Value],
    stats: &UpdateStatistics,
) -> Map<String, Value> {
    let prefix = operation_prefix(operation);
    let info_type = Value::String(format!("{}Info", prefix));
    let mut shaped = Map::new();
    for field in payload {
        match field {
            PayloadField::Typename { key } => {
                let name = if operation == OperationKind::Delete {
                    info_type.clone()
                } else {
                    Value::String(format!("{}{}MutationResponse", prefix, capitalize(plural)))
                };
                shaped.insert(key.clone(), name);
            }
            PayloadField::Nodes { key, selection } => {
                let nodes = written.iter().map(|node| shape_node(selection, node)).collect();
                shaped.insert(key.clone(), Value::Array(nodes));
            }
            PayloadField::Info { key, fields } => {
                let mut info = Map::new();
                for (name, field) in fields {
                    let value = counter(stats, *field).unwrap_or_else(|| info_type.clone());
                    info.insert(name.clone(), value);
                }
                shaped.insert(key.clone(), Value::Object(info));
            }
            PayloadField::Counter { key, field } => {
                let value = counter(stats, *field).unwrap_or_else(|| info_type.clone());
                shaped.insert(key.clone(), value);
            }
        }
    }
    log::debug!("Shaped {} payload for {}", prefix, type_name);
    shaped
}
