use graphql_cypher::execution::ExecutionOutput;
use graphql_cypher::selection::{leaves, FieldSelection};
use graphql_cypher::{OperationKind, Translator};
use serde_json::{json, Map, Value};
use test_case::test_case;

use super::fixture_schema;

fn compile_read(node_type: &str, field: &FieldSelection) -> graphql_cypher::CompiledStatement {
    let schema = fixture_schema();
    Translator::new(&schema, None, 16)
        .translate(OperationKind::Read, node_type, field)
        .unwrap()
}

#[test_case(json!({"title": "needle-literal"}), "needle-literal" ; "equality")]
#[test_case(json!({"title_NOT": "needle-literal"}), "needle-literal" ; "negation")]
#[test_case(json!({"title_CONTAINS": "needle-literal"}), "needle-literal" ; "contains")]
#[test_case(json!({"title_IN": ["needle-literal", "other"]}), "needle-literal" ; "membership")]
#[test_case(json!({"OR": [{"title_STARTS_WITH": "needle-literal"}, {"released_GT": 1999}]}), "needle-literal" ; "logical group")]
#[test_case(json!({"actors_SOME": {"name": "needle-literal"}}), "needle-literal" ; "relationship quantifier")]
fn test_filter_literals_only_travel_as_parameters(filter: Value, literal: &str) {
    let field = FieldSelection::new("movies")
        .arg("where", filter)
        .select(leaves(&["title"]));
    let compiled = compile_read("Movie", &field);
    assert!(!compiled.statement.contains(literal), "{}", compiled.statement);
    assert!(compiled
        .parameters
        .values()
        .any(|v| v == &json!(literal) || v.as_array().map_or(false, |a| a.contains(&json!(literal)))));
}

#[test]
fn test_nested_selection_reuses_parent_variable() {
    let field = FieldSelection::new("movies").select(vec![
        FieldSelection::new("title"),
        FieldSelection::new("actors").select(vec![
            FieldSelection::new("name"),
            FieldSelection::new("movies").select(leaves(&["title"])),
        ]),
    ]);
    let compiled = compile_read("Movie", &field);
    let text = &compiled.statement;
    assert_eq!(text.matches("MATCH (this:Movie)").count(), 1);
    assert!(text.contains("MATCH (this)<-[:ACTED_IN]-(this_actors:Actor)"));
    assert!(text.contains("MATCH (this_actors)-[:ACTED_IN]->(this_actors_movies:Movie)"));
}

#[test]
fn test_pagination_values_are_parameters() {
    let field = FieldSelection::new("movies")
        .arg("options", json!({"limit": 2, "offset": 3}))
        .select(leaves(&["title"]));
    let compiled = compile_read("Movie", &field);
    assert!(compiled.statement.contains("SKIP $this_offset\nLIMIT $this_limit"));
    assert_eq!(compiled.parameters["this_offset"], json!(3));
    assert_eq!(compiled.parameters["this_limit"], json!(2));
}

#[test]
fn test_sort_adds_only_requested_keys() {
    let field = FieldSelection::new("actors")
        .arg("options", json!({"sort": [{"name": "ASC"}]}))
        .select(leaves(&["name"]));
    let compiled = compile_read("Actor", &field);
    assert!(compiled.statement.contains("ORDER BY this.name ASC\n"));
    assert_eq!(compiled.statement.matches("ORDER BY").count(), 1);
}

#[test]
fn test_result_round_trip() {
    let field = FieldSelection::new("movies").select(vec![
        FieldSelection::new("title"),
        FieldSelection::new("released"),
        FieldSelection::new("actors").select(leaves(&["name"])),
    ]);
    let compiled = compile_read("Movie", &field);

    let node = json!({"title": "Heat", "released": 1995, "actors": [{"name": "Al"}]});
    let mut row = Map::new();
    row.insert("this".to_string(), node.clone());
    let folded = compiled.shape.fold(&ExecutionOutput::from_rows(vec![row])).unwrap();
    assert_eq!(folded, json!([node]));
}

#[test]
fn test_aliases_shape_the_projection() {
    let field = FieldSelection::new("movies").select(vec![
        FieldSelection::new("title").alias("name"),
        FieldSelection::new("actors").alias("cast").select(leaves(&["name"])),
    ]);
    let compiled = compile_read("Movie", &field);
    assert!(compiled
        .statement
        .ends_with("RETURN this { name: this.title, cast: this_cast } AS this"));
}

#[test]
fn test_unknown_field_is_schema_mismatch() {
    let schema = fixture_schema();
    let field = FieldSelection::new("movies").select(leaves(&["nope"]));
    let error = Translator::new(&schema, None, 16)
        .translate(OperationKind::Read, "Movie", &field)
        .unwrap_err();
    assert_eq!(error.code(), "SCHEMA_MISMATCH");
}
