//! Shared registry fixture for unit tests.

use super::config::GraphSchemaConfig;
use super::graph_schema::GraphSchema;

pub const TEST_SCHEMA_YAML: &str = include_str!("../../tests/rust/fixtures/schema.yaml");

pub fn test_schema() -> GraphSchema {
    GraphSchemaConfig::from_yaml_str(TEST_SCHEMA_YAML)
        .and_then(|config| config.to_graph_schema())
        .expect("fixture schema is valid")
}
