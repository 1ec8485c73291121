pub mod auth_rules;
pub mod config;
pub mod errors;
pub mod graph_schema;

#[cfg(test)]
pub mod testing;

pub use auth_rules::{AuthOperation, AuthPredicate, AuthRule, AuthValue};
pub use config::GraphSchemaConfig;
pub use errors::GraphSchemaError;
pub use graph_schema::{
    Direction, GraphSchema, NodeType, PropertyField, QueryLimits, RelationshipField,
    RelationshipProperties, TimestampOperation,
};
