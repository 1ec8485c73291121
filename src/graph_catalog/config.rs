use super::auth_rules::AuthRuleDefinition;
use super::errors::GraphSchemaError;
use super::graph_schema::{
    pluralize, Direction, GraphSchema, NodeType, PropertyField, QueryLimits, RelationshipField,
    RelationshipProperties, TimestampOperation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Graph schema definition loading.
///
/// The registry is normally produced by a type-definition front end; this
/// module accepts the same information as YAML (or JSON, which YAML parses):
///
/// ```yaml
/// name: blog
/// nodes:
///   - name: Comment
///     properties:
///       - { name: comment_id, type: ID, required: true }
///     relationships:
///       - name: post
///         type: HAS_POST
///         direction: OUT
///         target: Post
///         required: true
///   - name: Post
///     properties:
///       - { name: post_id, type: ID, required: true }
///     auth:
///       - operations: [UPDATE, DELETE]
///         allow: { author: { id: "$jwt.sub" } }
/// relationship_properties:
///   - name: ActedIn
///     properties:
///       - { name: role, type: String }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSchemaConfig {
    /// Optional schema name, used in log output
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub relationship_properties: Vec<RelationshipPropertiesDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub name: String,
    /// Database labels; defaults to `[name]`
    #[serde(default)]
    pub labels: Vec<String>,
    /// Response key used by mutation payloads; defaults to the pluralized name
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub limit: Option<QueryLimits>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
    #[serde(default)]
    pub auth: Vec<AuthRuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type", default = "default_scalar_type")]
    pub scalar_type: String,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, alias = "alias")]
    pub db_property: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub coalesce: Option<Value>,
    #[serde(default)]
    pub autogenerate: bool,
    #[serde(default)]
    pub timestamps: Vec<TimestampOperation>,
    #[serde(default)]
    pub auth: Vec<AuthRuleDefinition>,
}

fn default_scalar_type() -> String {
    "String".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    /// Single target type
    #[serde(default)]
    pub target: Option<String>,
    /// Union member types
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipPropertiesDefinition {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

impl PropertyDefinition {
    fn to_field(&self, owner: &str) -> Result<PropertyField, GraphSchemaError> {
        Ok(PropertyField {
            name: self.name.clone(),
            scalar_type: self.scalar_type.clone(),
            array: self.array,
            required: self.required,
            db_property: self.db_property.clone(),
            default_value: self.default.clone(),
            coalesce_value: self.coalesce.clone(),
            autogenerate: self.autogenerate,
            timestamps: self.timestamps.clone(),
            auth: self
                .auth
                .iter()
                .cloned()
                .map(|r| r.into_rule(owner))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl RelationshipDefinition {
    fn to_field(&self, owner: &str) -> Result<RelationshipField, GraphSchemaError> {
        let mut targets = self.targets.clone();
        if let Some(target) = &self.target {
            targets.insert(0, target.clone());
        }
        if targets.is_empty() {
            return Err(GraphSchemaError::InvalidConfig {
                message: format!(
                    "relationship {}.{} needs `target` or `targets`",
                    owner, self.name
                ),
            });
        }
        Ok(RelationshipField {
            name: self.name.clone(),
            rel_type: self.rel_type.clone(),
            direction: self.direction,
            targets,
            properties: self.properties.clone(),
            array: self.array,
            required: self.required,
        })
    }
}

impl GraphSchemaConfig {
    /// Load configuration from a YAML (or JSON) file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphSchemaError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| GraphSchemaError::ConfigReadError {
                error: e.to_string(),
            })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, GraphSchemaError> {
        serde_yaml::from_str(yaml).map_err(|e| GraphSchemaError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Build the read-only registry from this definition
    pub fn to_graph_schema(&self) -> Result<GraphSchema, GraphSchemaError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for def in &self.nodes {
            let labels = if def.labels.is_empty() {
                vec![def.name.clone()]
            } else {
                def.labels.clone()
            };
            nodes.push(NodeType {
                name: def.name.clone(),
                labels,
                plural: def.plural.clone().unwrap_or_else(|| pluralize(&def.name)),
                properties: def
                    .properties
                    .iter()
                    .map(|p| p.to_field(&def.name))
                    .collect::<Result<_, _>>()?,
                relationships: def
                    .relationships
                    .iter()
                    .map(|r| r.to_field(&def.name))
                    .collect::<Result<_, _>>()?,
                auth: def
                    .auth
                    .iter()
                    .cloned()
                    .map(|r| r.into_rule(&def.name))
                    .collect::<Result<_, _>>()?,
                limits: def.limit,
            });
        }

        let relationship_properties = self
            .relationship_properties
            .iter()
            .map(|def| {
                Ok(RelationshipProperties {
                    name: def.name.clone(),
                    properties: def
                        .properties
                        .iter()
                        .map(|p| p.to_field(&def.name))
                        .collect::<Result<_, GraphSchemaError>>()?,
                })
            })
            .collect::<Result<Vec<_>, GraphSchemaError>>()?;

        log::info!(
            "Loading graph schema '{}'",
            self.name.as_deref().unwrap_or("default")
        );
        GraphSchema::build(nodes, relationship_properties)
    }
}
