use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::auth_rules::AuthRule;
use super::errors::GraphSchemaError;

lazy_static! {
    /// Labels, relationship types and property names are written into statement
    /// text unescaped, so they are restricted to plain identifiers.
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

fn check_identifier(name: &str, context: impl FnOnce() -> String) -> Result<(), GraphSchemaError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(GraphSchemaError::invalid_identifier(name, context()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "OUT", alias = "OUTGOING")]
    Out,
    #[serde(rename = "IN", alias = "INCOMING")]
    In,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "OUT"),
            Direction::In => write!(f, "IN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimestampOperation {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyField {
    pub name: String,
    /// Declared scalar type name (`ID`, `String`, `Int`, ...); informational only
    pub scalar_type: String,
    pub array: bool,
    pub required: bool,
    /// Property name in the database when it differs from the field name
    pub db_property: Option<String>,
    /// Filled in on create when the input omits the field
    pub default_value: Option<Value>,
    /// Substituted for a missing database value when reading or filtering
    pub coalesce_value: Option<Value>,
    /// `randomUUID()` on create when the input omits the field
    pub autogenerate: bool,
    pub timestamps: Vec<TimestampOperation>,
    pub auth: Vec<AuthRule>,
}

impl PropertyField {
    pub fn new(name: impl Into<String>, scalar_type: impl Into<String>) -> Self {
        PropertyField {
            name: name.into(),
            scalar_type: scalar_type.into(),
            array: false,
            required: false,
            db_property: None,
            default_value: None,
            coalesce_value: None,
            autogenerate: false,
            timestamps: Vec::new(),
            auth: Vec::new(),
        }
    }

    pub fn db_name(&self) -> &str {
        self.db_property.as_deref().unwrap_or(&self.name)
    }

    /// True when the value is produced by the database rather than the caller
    pub fn is_generated(&self) -> bool {
        self.autogenerate || !self.timestamps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipField {
    pub name: String,
    pub rel_type: String,
    pub direction: Direction,
    /// Target node type names; more than one makes this a union field
    pub targets: Vec<String>,
    /// Relationship-properties type carried on the edge
    pub properties: Option<String>,
    pub array: bool,
    pub required: bool,
}

impl RelationshipField {
    pub fn is_union(&self) -> bool {
        self.targets.len() > 1
    }

    /// Only singular relationships are checked for presence after a write;
    /// an empty list satisfies a required list field.
    pub fn requires_edge(&self) -> bool {
        self.required && !self.array
    }

    /// Render `-[var:TYPE]->` or `<-[var:TYPE]-` for this field's direction.
    pub fn pattern(&self, variable: Option<&str>) -> String {
        let inner = format!("{}:{}", variable.unwrap_or(""), self.rel_type);
        match self.direction {
            Direction::Out => format!("-[{}]->", inner),
            Direction::In => format!("<-[{}]-", inner),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimits {
    #[serde(default)]
    pub default: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

impl QueryLimits {
    /// Effective limit for a list given the caller's requested limit.
    pub fn apply(&self, requested: Option<u64>) -> Option<u64> {
        let limit = requested.or(self.default);
        match (limit, self.max) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (None, Some(max)) => Some(max),
            (limit, None) => limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeType {
    pub name: String,
    /// Database labels; the first one is the primary label
    pub labels: Vec<String>,
    /// Response key for lists of this type in mutation payloads
    pub plural: String,
    pub properties: Vec<PropertyField>,
    pub relationships: Vec<RelationshipField>,
    pub auth: Vec<AuthRule>,
    pub limits: Option<QueryLimits>,
}

impl NodeType {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        NodeType {
            labels: vec![name.clone()],
            plural: pluralize(&name),
            name,
            properties: Vec::new(),
            relationships: Vec::new(),
            auth: Vec::new(),
            limits: None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyField> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipField> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// `:Movie:Film`
    pub fn label_string(&self) -> String {
        self.labels.iter().map(|l| format!(":{}", l)).collect()
    }

    pub fn required_relationships(&self) -> impl Iterator<Item = &RelationshipField> {
        self.relationships.iter().filter(|r| r.requires_edge())
    }

    pub fn has_auth(&self) -> bool {
        !self.auth.is_empty()
    }

    fn validate(&self) -> Result<(), GraphSchemaError> {
        check_identifier(&self.name, || "node type name".to_string())?;
        check_identifier(&self.plural, || format!("plural of {}", self.name))?;
        for label in &self.labels {
            check_identifier(label, || format!("label of {}", self.name))?;
        }

        let mut seen = HashSet::new();
        for property in &self.properties {
            check_identifier(&property.name, || format!("field of {}", self.name))?;
            check_identifier(property.db_name(), || {
                format!("database property of {}.{}", self.name, property.name)
            })?;
            if !seen.insert(property.name.as_str()) {
                return Err(GraphSchemaError::DuplicateField {
                    type_name: self.name.clone(),
                    field: property.name.clone(),
                });
            }
        }
        for rel in &self.relationships {
            check_identifier(&rel.name, || format!("field of {}", self.name))?;
            check_identifier(&rel.rel_type, || {
                format!("relationship type of {}.{}", self.name, rel.name)
            })?;
            if rel.targets.is_empty() {
                return Err(GraphSchemaError::InvalidConfig {
                    message: format!("{}.{} declares no target type", self.name, rel.name),
                });
            }
            if !seen.insert(rel.name.as_str()) {
                return Err(GraphSchemaError::DuplicateField {
                    type_name: self.name.clone(),
                    field: rel.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Properties carried by a relationship (the edge itself).
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipProperties {
    pub name: String,
    pub properties: Vec<PropertyField>,
}

impl RelationshipProperties {
    pub fn property(&self, name: &str) -> Option<&PropertyField> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// The metadata registry: every node kind and relationship-properties type
/// of one schema. Built once and read concurrently afterwards.
#[derive(Debug, Clone, Default)]
pub struct GraphSchema {
    nodes: HashMap<String, NodeType>,
    relationship_properties: HashMap<String, RelationshipProperties>,
}

impl GraphSchema {
    pub fn build(
        nodes: Vec<NodeType>,
        relationship_properties: Vec<RelationshipProperties>,
    ) -> Result<Self, GraphSchemaError> {
        let mut schema = GraphSchema::default();
        for node in nodes {
            node.validate()?;
            if schema.nodes.contains_key(&node.name) {
                return Err(GraphSchemaError::DuplicateType { name: node.name });
            }
            schema.nodes.insert(node.name.clone(), node);
        }
        for props in relationship_properties {
            check_identifier(&props.name, || "relationship properties name".to_string())?;
            for property in &props.properties {
                check_identifier(property.db_name(), || {
                    format!("database property of {}.{}", props.name, property.name)
                })?;
            }
            if schema.relationship_properties.contains_key(&props.name)
                || schema.nodes.contains_key(&props.name)
            {
                return Err(GraphSchemaError::DuplicateType { name: props.name });
            }
            schema
                .relationship_properties
                .insert(props.name.clone(), props);
        }
        log::debug!(
            "Built graph schema with {} node types and {} relationship properties types",
            schema.nodes.len(),
            schema.relationship_properties.len()
        );
        Ok(schema)
    }

    pub fn node(&self, name: &str) -> Result<&NodeType, GraphSchemaError> {
        self.nodes.get(name).ok_or_else(|| GraphSchemaError::Node {
            node_label: name.to_string(),
        })
    }

    pub fn node_opt(&self, name: &str) -> Option<&NodeType> {
        self.nodes.get(name)
    }

    /// Resolve every target of a relationship field, failing on the first
    /// one missing from the registry.
    pub fn targets_of(&self, field: &RelationshipField) -> Result<Vec<&NodeType>, GraphSchemaError> {
        field
            .targets
            .iter()
            .map(|name| {
                self.nodes.get(name).ok_or_else(|| {
                    GraphSchemaError::node_error_with_context(
                        name.as_str(),
                        format!("Target of relationship field {}", field.name),
                    )
                })
            })
            .collect()
    }

    pub fn relationship_properties(
        &self,
        field: &RelationshipField,
    ) -> Result<Option<&RelationshipProperties>, GraphSchemaError> {
        match &field.properties {
            None => Ok(None),
            Some(name) => self
                .relationship_properties
                .get(name)
                .map(Some)
                .ok_or_else(|| GraphSchemaError::RelationshipProperties { name: name.clone() }),
        }
    }

    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.nodes.values()
    }
}

/// `Movie` -> `movies`, `Category` -> `categories`, `Address` -> `addresses`
pub fn pluralize(name: &str) -> String {
    let mut chars = name.chars();
    let camel: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => return String::new(),
    };
    let ends_with_consonant_y = camel.ends_with('y')
        && !matches!(
            camel.chars().rev().nth(1),
            Some('a' | 'e' | 'i' | 'o' | 'u')
        );
    if ends_with_consonant_y {
        format!("{}ies", &camel[..camel.len() - 1])
    } else if camel.ends_with('s') || camel.ends_with('x') || camel.ends_with("ch") || camel.ends_with("sh") {
        format!("{}es", camel)
    } else {
        format!("{}s", camel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("Movie"), "movies");
        assert_eq!(pluralize("Category"), "categories");
        assert_eq!(pluralize("Address"), "addresses");
        assert_eq!(pluralize("Day"), "days");
        assert_eq!(pluralize("BlogPost"), "blogPosts");
    }

    #[test]
    fn test_relationship_pattern_direction() {
        let rel = RelationshipField {
            name: "post".to_string(),
            rel_type: "HAS_POST".to_string(),
            direction: Direction::Out,
            targets: vec!["Post".to_string()],
            properties: None,
            array: false,
            required: true,
        };
        assert_eq!(rel.pattern(None), "-[:HAS_POST]->");
        let inbound = RelationshipField {
            direction: Direction::In,
            ..rel.clone()
        };
        assert_eq!(inbound.pattern(Some("r")), "<-[r:HAS_POST]-");
        assert!(rel.requires_edge());
    }

    #[test]
    fn test_query_limits() {
        let limits = QueryLimits {
            default: Some(10),
            max: Some(50),
        };
        assert_eq!(limits.apply(None), Some(10));
        assert_eq!(limits.apply(Some(5)), Some(5));
        assert_eq!(limits.apply(Some(500)), Some(50));
    }

    #[test]
    fn test_rejects_invalid_identifiers() {
        let mut node = NodeType::new("Movie");
        node.labels = vec!["Movie`) DETACH DELETE (n".to_string()];
        assert!(matches!(
            GraphSchema::build(vec![node], vec![]),
            Err(GraphSchemaError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_types() {
        let result = GraphSchema::build(vec![NodeType::new("Movie"), NodeType::new("Movie")], vec![]);
        assert_eq!(
            result.unwrap_err(),
            GraphSchemaError::DuplicateType {
                name: "Movie".to_string()
            }
        );
    }

    #[test]
    fn test_missing_target_is_lazy() {
        let mut comment = NodeType::new("Comment");
        comment.relationships.push(RelationshipField {
            name: "post".to_string(),
            rel_type: "HAS_POST".to_string(),
            direction: Direction::Out,
            targets: vec!["Post".to_string()],
            properties: None,
            array: false,
            required: true,
        });
        let schema = GraphSchema::build(vec![comment], vec![]).unwrap();
        let node = schema.node("Comment").unwrap();
        let rel = node.relationship("post").unwrap();
        assert!(schema.targets_of(rel).is_err());
    }
}
