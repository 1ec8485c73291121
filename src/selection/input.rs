//! Mutation input parsing.
//!
//! The loose `input` / `update` / `connect` / ... objects of a mutation are
//! turned into a closed set of blocks, one per nested operation, in the order
//! they were written. Singular relationship fields accept a single object
//! where a list is expected, and union fields are keyed by member type.

use serde_json::{Map, Value};

use super::where_parser::{expect_object, parse_optional_where, FieldSource, WherePredicate};
use crate::errors::TranslationError;
use crate::graph_catalog::{GraphSchema, NodeType, RelationshipField, RelationshipProperties};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Set,
    Increment,
    Decrement,
    /// Append to a list property
    Push,
    /// Remove this many elements from the end of a list property
    Pop,
}

const WRITE_SUFFIXES: &[(&str, WriteOperation)] = &[
    ("_INCREMENT", WriteOperation::Increment),
    ("_DECREMENT", WriteOperation::Decrement),
    ("_PUSH", WriteOperation::Push),
    ("_POP", WriteOperation::Pop),
];

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    pub field: String,
    pub operation: WriteOperation,
    pub value: Value,
}

/// Properties and relationship blocks written to one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInput {
    pub properties: Vec<PropertyWrite>,
    pub relationships: Vec<RelationshipInput>,
}

impl NodeInput {
    pub fn property(&self, field: &str) -> Option<&PropertyWrite> {
        self.properties.iter().find(|p| p.field == field)
    }

    /// True when some block creates or connects a node through `field`.
    pub fn attaches(&self, field: &str) -> bool {
        self.relationships
            .iter()
            .filter(|r| r.field == field)
            .flat_map(|r| r.blocks.iter())
            .any(|b| matches!(b, MutationBlock::Create(_) | MutationBlock::Connect(_)))
    }
}

/// Blocks for one relationship field and one concrete target type.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipInput {
    pub field: String,
    pub target: String,
    pub blocks: Vec<MutationBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationBlock {
    Create(NestedCreate),
    Connect(NestedConnect),
    Disconnect(NestedDisconnect),
    Update(NestedUpdate),
    Delete(NestedDelete),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedCreate {
    pub node: NodeInput,
    pub edge: Vec<PropertyWrite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedConnect {
    pub filter: Option<WherePredicate>,
    pub edge: Vec<PropertyWrite>,
    /// Further connections made from the connected node
    pub connect: Vec<RelationshipInput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedDisconnect {
    pub node_filter: Option<WherePredicate>,
    pub edge_filter: Option<WherePredicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedUpdate {
    pub node_filter: Option<WherePredicate>,
    pub edge_filter: Option<WherePredicate>,
    pub node: Option<NodeInput>,
    pub edge: Vec<PropertyWrite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedDelete {
    pub node_filter: Option<WherePredicate>,
    pub delete: Vec<RelationshipInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Create,
    Connect,
    Disconnect,
    Update,
    Delete,
}

impl BlockKind {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "create" => Some(BlockKind::Create),
            "connect" => Some(BlockKind::Connect),
            "disconnect" => Some(BlockKind::Disconnect),
            "update" => Some(BlockKind::Update),
            "delete" => Some(BlockKind::Delete),
            _ => None,
        }
    }
}

pub struct InputParser<'a> {
    schema: &'a GraphSchema,
}

impl<'a> InputParser<'a> {
    pub fn new(schema: &'a GraphSchema) -> Self {
        InputParser { schema }
    }

    /// `input` element of a create mutation, or `node` of a nested create.
    pub fn create_input(&self, node: &NodeType, value: &Value) -> Result<NodeInput, TranslationError> {
        let map = expect_object(value, || format!("create input for {}", node.name))?;
        let mut input = NodeInput::default();
        for (key, value) in map {
            if let Some(property) = node.property(key) {
                input.properties.push(PropertyWrite {
                    field: property.name.clone(),
                    operation: WriteOperation::Set,
                    value: value.clone(),
                });
            } else if let Some(relationship) = node.relationship(key) {
                self.per_target(relationship, value, |target, value| {
                    let blocks = self.field_blocks(relationship, target, value, &[BlockKind::Create, BlockKind::Connect])?;
                    Ok(RelationshipInput {
                        field: relationship.name.clone(),
                        target: target.name.clone(),
                        blocks,
                    })
                }, &mut input.relationships)?;
            } else {
                return Err(unknown_input(key, &node.name));
            }
        }
        Ok(input)
    }

    /// `update` argument of an update mutation, or `node` of a nested update.
    pub fn update_input(&self, node: &NodeType, value: &Value) -> Result<NodeInput, TranslationError> {
        let map = expect_object(value, || format!("update input for {}", node.name))?;
        let mut input = NodeInput::default();
        for (key, value) in map {
            if let Some(relationship) = node.relationship(key) {
                self.per_target(relationship, value, |target, value| {
                    Ok(RelationshipInput {
                        field: relationship.name.clone(),
                        target: target.name.clone(),
                        blocks: self.update_elements(relationship, target, value)?,
                    })
                }, &mut input.relationships)?;
            } else {
                input.properties.push(property_write(node, key, value, true)?);
            }
        }
        Ok(input)
    }

    /// Top-level `connect` / `disconnect` / `create` / `delete` argument:
    /// an object keyed by relationship field.
    pub fn relationship_argument(
        &self,
        node: &NodeType,
        kind: BlockKind,
        value: &Value,
    ) -> Result<Vec<RelationshipInput>, TranslationError> {
        let map = expect_object(value, || format!("{:?} argument for {}", kind, node.name))?;
        let mut inputs = Vec::new();
        for (key, value) in map {
            let relationship = node
                .relationship(key)
                .ok_or_else(|| unknown_input(key, &node.name))?;
            self.per_target(relationship, value, |target, value| {
                Ok(RelationshipInput {
                    field: relationship.name.clone(),
                    target: target.name.clone(),
                    blocks: self.items(relationship, target, kind, value)?,
                })
            }, &mut inputs)?;
        }
        Ok(inputs)
    }

    /// Run `parse` once per concrete target; union values are keyed by member.
    fn per_target<F>(
        &self,
        relationship: &RelationshipField,
        value: &Value,
        mut parse: F,
        out: &mut Vec<RelationshipInput>,
    ) -> Result<(), TranslationError>
    where
        F: FnMut(&NodeType, &Value) -> Result<RelationshipInput, TranslationError>,
    {
        let targets = self.schema.targets_of(relationship)?;
        if !relationship.is_union() {
            out.push(parse(targets[0], value)?);
            return Ok(());
        }
        let map = expect_object(value, || format!("union input for {}", relationship.name))?;
        for (member, member_value) in map {
            let target = targets.iter().find(|t| &t.name == member).ok_or_else(|| {
                TranslationError::schema(format!(
                    "{} is not a member of union field {}",
                    member, relationship.name
                ))
            })?;
            out.push(parse(*target, member_value)?);
        }
        Ok(())
    }

    /// `{ create: [...], connect: [...] }` for one field of a create input.
    fn field_blocks(
        &self,
        relationship: &RelationshipField,
        target: &NodeType,
        value: &Value,
        allowed: &[BlockKind],
    ) -> Result<Vec<MutationBlock>, TranslationError> {
        let map = expect_object(value, || format!("input for {}", relationship.name))?;
        let mut blocks = Vec::new();
        for (key, value) in map {
            let kind = BlockKind::from_key(key)
                .filter(|k| allowed.contains(k))
                .ok_or_else(|| unknown_input(key, &relationship.name))?;
            blocks.extend(self.items(relationship, target, kind, value)?);
        }
        Ok(blocks)
    }

    /// Elements of a relationship field inside an update: each element may
    /// carry `where`, `update`, `connect`, `disconnect`, `create`, `delete`.
    fn update_elements(
        &self,
        relationship: &RelationshipField,
        target: &NodeType,
        value: &Value,
    ) -> Result<Vec<MutationBlock>, TranslationError> {
        let edge = self.schema.relationship_properties(relationship)?;
        let mut blocks = Vec::new();
        for element in as_list(value) {
            let map = expect_object(element, || format!("update of {}", relationship.name))?;
            let (node_filter, edge_filter) = match map.get("where") {
                Some(filter) => self.node_edge_filter(target, edge, filter)?,
                None => (None, None),
            };
            for (key, value) in map {
                if key == "where" {
                    continue;
                }
                let kind = BlockKind::from_key(key).ok_or_else(|| unknown_input(key, &relationship.name))?;
                if kind == BlockKind::Update {
                    let update = expect_object(value, || format!("update of {}", relationship.name))?;
                    blocks.push(MutationBlock::Update(NestedUpdate {
                        node_filter: node_filter.clone(),
                        edge_filter: edge_filter.clone(),
                        node: update
                            .get("node")
                            .map(|n| self.update_input(target, n))
                            .transpose()?,
                        edge: self.edge_writes(relationship, edge, update.get("edge"), true)?,
                    }));
                } else {
                    blocks.extend(self.items(relationship, target, kind, value)?);
                }
            }
        }
        Ok(blocks)
    }

    /// A list (or single object) of blocks of one kind.
    fn items(
        &self,
        relationship: &RelationshipField,
        target: &NodeType,
        kind: BlockKind,
        value: &Value,
    ) -> Result<Vec<MutationBlock>, TranslationError> {
        let edge = self.schema.relationship_properties(relationship)?;
        let mut blocks = Vec::new();
        for item in as_list(value) {
            let map = expect_object(item, || format!("{:?} of {}", kind, relationship.name))?;
            check_keys(map, allowed_keys(kind), &relationship.name)?;
            let filter = map.get("where");
            let block = match kind {
                BlockKind::Create => {
                    let node = map.get("node").ok_or_else(|| {
                        TranslationError::schema(format!("create of {} needs `node`", relationship.name))
                    })?;
                    MutationBlock::Create(NestedCreate {
                        node: self.create_input(target, node)?,
                        edge: self.edge_writes(relationship, edge, map.get("edge"), false)?,
                    })
                }
                BlockKind::Connect => {
                    let (node_filter, _) = match filter {
                        Some(f) => self.node_edge_filter(target, None, f)?,
                        None => (None, None),
                    };
                    MutationBlock::Connect(NestedConnect {
                        filter: node_filter,
                        edge: self.edge_writes(relationship, edge, map.get("edge"), false)?,
                        connect: match map.get("connect") {
                            Some(nested) => self.connect_chain(target, nested)?,
                            None => Vec::new(),
                        },
                    })
                }
                BlockKind::Disconnect => {
                    let (node_filter, edge_filter) = match filter {
                        Some(f) => self.node_edge_filter(target, edge, f)?,
                        None => (None, None),
                    };
                    MutationBlock::Disconnect(NestedDisconnect {
                        node_filter,
                        edge_filter,
                    })
                }
                BlockKind::Update => {
                    let (node_filter, edge_filter) = match filter {
                        Some(f) => self.node_edge_filter(target, edge, f)?,
                        None => (None, None),
                    };
                    let update = map.get("update").map(|u| expect_object(u, || "update".to_string())).transpose()?;
                    MutationBlock::Update(NestedUpdate {
                        node_filter,
                        edge_filter,
                        node: update
                            .and_then(|u| u.get("node"))
                            .map(|n| self.update_input(target, n))
                            .transpose()?,
                        edge: self.edge_writes(relationship, edge, update.and_then(|u| u.get("edge")), true)?,
                    })
                }
                BlockKind::Delete => {
                    let (node_filter, _) = match filter {
                        Some(f) => self.node_edge_filter(target, None, f)?,
                        None => (None, None),
                    };
                    MutationBlock::Delete(NestedDelete {
                        node_filter,
                        delete: match map.get("delete") {
                            Some(nested) => self.relationship_argument(target, BlockKind::Delete, nested)?,
                            None => Vec::new(),
                        },
                    })
                }
            };
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Nested `connect` of a connected node: `{ field: [{ where, edge, connect }] }`
    fn connect_chain(&self, node: &NodeType, value: &Value) -> Result<Vec<RelationshipInput>, TranslationError> {
        self.relationship_argument(node, BlockKind::Connect, value)
    }

    /// `{ node: {...}, edge: {...} }` filter pair
    fn node_edge_filter(
        &self,
        target: &NodeType,
        edge: Option<&RelationshipProperties>,
        value: &Value,
    ) -> Result<(Option<WherePredicate>, Option<WherePredicate>), TranslationError> {
        let map = expect_object(value, || format!("where for {}", target.name))?;
        let mut node_filter = None;
        let mut edge_filter = None;
        for (key, value) in map {
            match (key.as_str(), edge) {
                ("node", _) => node_filter = parse_optional_where(self.schema, target, Some(value))?,
                ("edge", Some(edge)) => {
                    edge_filter = parse_optional_where(self.schema, edge as &dyn FieldSource, Some(value))?
                }
                _ => return Err(unknown_input(key, &target.name)),
            }
        }
        Ok((node_filter, edge_filter))
    }

    fn edge_writes(
        &self,
        relationship: &RelationshipField,
        edge: Option<&RelationshipProperties>,
        value: Option<&Value>,
        allow_operations: bool,
    ) -> Result<Vec<PropertyWrite>, TranslationError> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(value) => value,
        };
        let edge = edge.ok_or_else(|| {
            TranslationError::schema(format!("{} has no edge properties", relationship.name))
        })?;
        let map = expect_object(value, || format!("edge input for {}", relationship.name))?;
        map.iter()
            .map(|(key, value)| property_write(edge, key, value, allow_operations))
            .collect()
    }
}

fn allowed_keys(kind: BlockKind) -> &'static [&'static str] {
    match kind {
        BlockKind::Create => &["node", "edge"],
        BlockKind::Connect => &["where", "edge", "connect"],
        BlockKind::Disconnect => &["where"],
        BlockKind::Update => &["where", "update"],
        BlockKind::Delete => &["where", "delete"],
    }
}

fn check_keys(map: &Map<String, Value>, allowed: &[&str], context: &str) -> Result<(), TranslationError> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(unknown_input(key, context)),
        None => Ok(()),
    }
}

fn property_write(
    source: &dyn FieldSource,
    key: &str,
    value: &Value,
    allow_operations: bool,
) -> Result<PropertyWrite, TranslationError> {
    let (property, operation) = match source.property_field(key) {
        Some(property) => (property, WriteOperation::Set),
        None => WRITE_SUFFIXES
            .iter()
            .filter(|_| allow_operations)
            .find_map(|(suffix, operation)| {
                key.strip_suffix(suffix)
                    .and_then(|base| source.property_field(base))
                    .map(|p| (p, *operation))
            })
            .ok_or_else(|| unknown_input(key, source.source_name()))?,
    };

    let valid = match operation {
        WriteOperation::Set => !property.array || value.is_array() || value.is_null(),
        WriteOperation::Increment | WriteOperation::Decrement => value.is_number(),
        WriteOperation::Push => property.array && !value.is_null(),
        WriteOperation::Pop => property.array && value.as_u64().is_some(),
    };
    if !valid || value.is_object() {
        return Err(TranslationError::schema(format!(
            "Invalid value {} for {:?} of {}.{}",
            value,
            operation,
            source.source_name(),
            property.name
        )));
    }
    Ok(PropertyWrite {
        field: property.name.clone(),
        operation,
        value: value.clone(),
    })
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn unknown_input(key: &str, context: &str) -> TranslationError {
    TranslationError::schema(format!("Unknown input field `{}` for {}", key, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::testing::test_schema;
    use serde_json::json;

    #[test]
    fn test_create_with_nested_blocks() {
        let schema = test_schema();
        let parser = InputParser::new(&schema);
        let movie = schema.node("Movie").unwrap();
        let input = parser
            .create_input(
                movie,
                &json!({
                    "title": "The Matrix",
                    "actors": {
                        "create": [{"node": {"name": "Keanu"}, "edge": {"role": "Neo"}}],
                        "connect": [{"where": {"node": {"name": "Carrie"}}}]
                    }
                }),
            )
            .unwrap();
        assert_eq!(input.properties.len(), 1);
        assert_eq!(input.relationships.len(), 1);
        let blocks = &input.relationships[0].blocks;
        assert!(matches!(&blocks[0], MutationBlock::Create(c) if c.edge.len() == 1));
        assert!(matches!(&blocks[1], MutationBlock::Connect(c) if c.filter.is_some()));
        assert!(input.attaches("actors"));
        assert!(!input.attaches("director"));
    }

    #[test]
    fn test_singular_field_accepts_object() {
        let schema = test_schema();
        let parser = InputParser::new(&schema);
        let comment = schema.node("Comment").unwrap();
        let input = parser
            .create_input(
                comment,
                &json!({"comment_id": "c1", "post": {"connect": {"where": {"node": {"post_id": "p1"}}}}}),
            )
            .unwrap();
        assert!(input.attaches("post"));
    }

    #[test]
    fn test_update_preserves_input_order() {
        let schema = test_schema();
        let parser = InputParser::new(&schema);
        let movie = schema.node("Movie").unwrap();
        let input = parser
            .update_input(
                movie,
                &json!({
                    "released_INCREMENT": 1,
                    "actors": [{
                        "connect": [{"where": {"node": {"name": "A"}}}],
                        "disconnect": [{"where": {"node": {"name": "B"}}}],
                        "where": {"node": {"name": "C"}},
                        "update": {"node": {"born": 1970}, "edge": {"screenTime_INCREMENT": 5}}
                    }]
                }),
            )
            .unwrap();
        assert_eq!(input.properties[0].operation, WriteOperation::Increment);
        let blocks = &input.relationships[0].blocks;
        assert!(matches!(blocks[0], MutationBlock::Connect(_)));
        assert!(matches!(blocks[1], MutationBlock::Disconnect(_)));
        match &blocks[2] {
            MutationBlock::Update(update) => {
                assert!(update.node_filter.is_some());
                assert_eq!(update.edge[0].operation, WriteOperation::Increment);
            }
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_union_blocks_keyed_by_member() {
        let schema = test_schema();
        let parser = InputParser::new(&schema);
        let actor = schema.node("Actor").unwrap();
        let inputs = parser
            .relationship_argument(
                actor,
                BlockKind::Connect,
                &json!({"search": {"Movie": [{"where": {"node": {"title": "A"}}}], "Series": [{}]}}),
            )
            .unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].target, "Movie");
        assert_eq!(inputs[1].target, "Series");
    }

    #[test]
    fn test_invalid_inputs() {
        let schema = test_schema();
        let parser = InputParser::new(&schema);
        let movie = schema.node("Movie").unwrap();
        assert!(parser.create_input(movie, &json!({"nope": 1})).is_err());
        assert!(parser.create_input(movie, &json!({"released_INCREMENT": 1})).is_err());
        assert!(parser.create_input(movie, &json!({"tags": "single"})).is_err());
        assert!(parser
            .create_input(movie, &json!({"actors": {"update": []}}))
            .is_err());
        assert!(parser
            .create_input(movie, &json!({"director": {"create": {"node": {"name": "W"}, "edge": {"x": 1}}}}))
            .is_err());
        assert!(parser.update_input(movie, &json!({"title_POP": 1})).is_err());
    }
}
