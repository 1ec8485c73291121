use graphql_cypher::auth::Claims;
use graphql_cypher::execution::AccessMode;
use graphql_cypher::selection::{leaves, FieldSelection};
use graphql_cypher::{OperationKind, TranslationError, Translator};
use serde_json::json;

use super::fixture_schema;

fn comment_create(input: serde_json::Value) -> FieldSelection {
    FieldSelection::new("createComments")
        .arg("input", input)
        .select(vec![FieldSelection::new("comments").select(leaves(&["comment_id"]))])
}

#[test]
fn test_required_relationship_without_input_fails_with_type_and_field() {
    let schema = fixture_schema();
    let error = Translator::new(&schema, None, 16)
        .translate(OperationKind::Create, "Comment", &comment_create(json!({"comment_id": "c1"})))
        .unwrap_err();
    assert_eq!(
        error,
        TranslationError::RequiredRelationship {
            type_name: "Comment".to_string(),
            field: "post".to_string()
        }
    );
    assert_eq!(error.to_string(), "Comment.post required");
}

#[test]
fn test_connect_to_required_relationship_is_validated_in_statement() {
    let schema = fixture_schema();
    let compiled = Translator::new(&schema, None, 16)
        .translate(
            OperationKind::Create,
            "Comment",
            &comment_create(json!({
                "comment_id": "c1",
                "post": {"connect": {"where": {"node": {"post_id": "nonexistent"}}}}
            })),
        )
        .unwrap();
    assert_eq!(compiled.access_mode, AccessMode::Write);
    let merge = compiled.statement.find("MERGE (this0)-[this0_post0_relationship:HAS_POST]->(this0_post0_node)");
    let check = compiled.statement.find("RELATIONSHIP-REQUIREDComment.post required");
    assert!(merge.is_some() && check.is_some());
    assert!(merge < check);
}

#[test]
fn test_mutation_blocks_keep_input_order() {
    let schema = fixture_schema();
    let field = FieldSelection::new("updateMovies")
        .arg("disconnect", json!({"actors": {"where": {"node": {"name": "A"}}}}))
        .arg("connect", json!({"actors": {"where": {"node": {"name": "B"}}}}))
        .select(vec![FieldSelection::new("movies").select(leaves(&["title"]))]);
    let compiled = Translator::new(&schema, None, 16)
        .translate(OperationKind::Update, "Movie", &field)
        .unwrap();
    let disconnect = compiled.statement.find("DELETE this_actors0_relationship");
    let connect = compiled.statement.find("MERGE (this)<-[this_actors1_relationship:ACTED_IN]-(this_actors1_node)");
    assert!(disconnect.is_some() && connect.is_some());
    assert!(disconnect < connect);
}

#[test]
fn test_bind_rule_runs_after_the_write() {
    let schema = fixture_schema();
    let claims = Claims::from_payload(json!({"sub": "u1"}), "roles");
    let field = FieldSelection::new("updateUsers")
        .arg("update", json!({"id": "u2"}))
        .select(vec![FieldSelection::new("users").select(leaves(&["id"]))]);
    let compiled = Translator::new(&schema, Some(&claims), 16)
        .translate(OperationKind::Update, "User", &field)
        .unwrap();
    let set = compiled.statement.find("SET this.id = $this_id").unwrap();
    let last_check = compiled.statement.rfind("CALL apoc.util.validate").unwrap();
    assert!(set < last_check);
    assert_eq!(compiled.parameters["this_id"], json!("u2"));
}

#[test]
fn test_delete_compiles_to_detach_delete() {
    let schema = fixture_schema();
    let field = FieldSelection::new("deleteMovies")
        .arg("where", json!({"title": "Heat"}))
        .select(vec![FieldSelection::new("nodesDeleted")]);
    let compiled = Translator::new(&schema, None, 16)
        .translate(OperationKind::Delete, "Movie", &field)
        .unwrap();
    assert_eq!(
        compiled.statement,
        "MATCH (this:Movie)\nWHERE this.title = $this_param0\nDETACH DELETE this"
    );
}
