use std::io::Write;

use graphql_cypher::config::CompilerConfig;
use graphql_cypher::graph_catalog::GraphSchemaConfig;
use graphql_cypher::selection::{leaves, FieldSelection};
use graphql_cypher::{OperationKind, Translator};

#[test]
fn test_schema_and_config_load_from_files() {
    let mut schema_file = tempfile::NamedTempFile::new().unwrap();
    write!(
        schema_file,
        r#"
name: library
nodes:
  - name: Book
    labels: [Book, Item]
    properties:
      - {{ name: isbn, type: ID, required: true }}
      - {{ name: title, type: String }}
"#
    )
    .unwrap();
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(config_file, "max_selection_depth: 3").unwrap();

    let schema = GraphSchemaConfig::from_yaml_file(schema_file.path())
        .and_then(|config| config.to_graph_schema())
        .unwrap();
    let config = CompilerConfig::from_yaml_file(config_file.path()).unwrap();
    assert_eq!(config.max_selection_depth, 3);

    let field = FieldSelection::new("books").select(leaves(&["title"]));
    let compiled = Translator::new(&schema, None, config.max_selection_depth)
        .translate(OperationKind::Read, "Book", &field)
        .unwrap();
    assert_eq!(compiled.statement, "MATCH (this:Book:Item)\nRETURN this { .title } AS this");
}

#[test]
fn test_relationship_to_unknown_type_fails_when_selected() {
    let yaml = r#"
name: broken
nodes:
  - name: Book
    properties:
      - { name: title, type: String }
    relationships:
      - { name: author, type: WROTE, direction: IN, target: Ghost }
"#;
    let schema = GraphSchemaConfig::from_yaml_str(yaml)
        .and_then(|config| config.to_graph_schema())
        .unwrap();
    let translator = Translator::new(&schema, None, 16);

    let plain = FieldSelection::new("books").select(leaves(&["title"]));
    assert!(translator.translate(OperationKind::Read, "Book", &plain).is_ok());

    let nested = FieldSelection::new("books").select(vec![FieldSelection::new("author").select(leaves(&["name"]))]);
    let error = translator.translate(OperationKind::Read, "Book", &nested).unwrap_err();
    assert_eq!(error.code(), "SCHEMA_MISMATCH");
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(config_file, "roles_claim_path: \"\"").unwrap();
    assert!(CompilerConfig::from_yaml_file(config_file.path()).is_err());
}
