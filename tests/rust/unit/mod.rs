//! Unit tests - compiler properties checked through the public API
//!
//! These tests only compile statements; nothing here talks to a graph engine.

mod read_properties_tests;
mod write_properties_tests;

use graphql_cypher::graph_catalog::{GraphSchema, GraphSchemaConfig};

pub(crate) fn fixture_schema() -> GraphSchema {
    GraphSchemaConfig::from_yaml_str(include_str!("../fixtures/schema.yaml"))
        .and_then(|config| config.to_graph_schema())
        .expect("fixture schema is valid")
}
