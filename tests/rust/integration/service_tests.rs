use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use graphql_cypher::config::CompilerConfig;
use graphql_cypher::execution::{
    AccessMode, ExecutionError, ExecutionOutput, ExecutionRequest, Executor, UpdateStatistics,
};
use graphql_cypher::graph_catalog::GraphSchemaConfig;
use graphql_cypher::selection::{leaves, FieldSelection};
use graphql_cypher::service::{GraphRequest, GraphService, RequestKind, RootField};
use graphql_cypher::OperationKind;
use mockall::mock;
use serde_json::{json, Map, Value};

mock! {
    pub Engine {}

    #[async_trait]
    impl Executor for Engine {
        async fn run(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutionError>;
    }
}

fn service(config: CompilerConfig) -> GraphService {
    let schema = GraphSchemaConfig::from_yaml_str(include_str!("../fixtures/schema.yaml"))
        .and_then(|config| config.to_graph_schema())
        .expect("fixture schema is valid");
    GraphService::new(Arc::new(schema), config)
}

fn token(payload: Value) -> String {
    format!("eyJhbGciOiJub25lIn0.{}.sig", URL_SAFE_NO_PAD.encode(payload.to_string()))
}

fn single_row(column: &str, value: Value) -> Vec<Map<String, Value>> {
    let mut row = Map::new();
    row.insert(column.to_string(), value);
    vec![row]
}

#[tokio::test]
async fn test_create_payload_is_folded_with_counters() {
    let service = service(CompilerConfig::default());
    let mut engine = MockEngine::new();
    engine
        .expect_run()
        .withf(|request| request.access_mode == AccessMode::Write && request.parameters["this0_title"] == json!("Heat"))
        .times(1)
        .returning(|_| {
            Ok(ExecutionOutput {
                rows: single_row("data", json!([{"title": "Heat"}])),
                stats: UpdateStatistics {
                    nodes_created: 1,
                    ..Default::default()
                },
            })
        });

    let request = GraphRequest {
        kind: RequestKind::Mutation,
        fields: vec![RootField {
            operation: OperationKind::Create,
            node_type: "Movie".to_string(),
            selection: FieldSelection::new("createMovies")
                .arg("input", json!([{"title": "Heat"}]))
                .select(vec![
                    FieldSelection::new("__typename"),
                    FieldSelection::new("movies").select(leaves(&["title"])),
                    FieldSelection::new("info").select(leaves(&["nodesCreated"])),
                ]),
        }],
        token: None,
    };
    let response = service.execute(&request, &engine).await;
    assert!(response.errors.is_empty());
    assert_eq!(
        response.data.unwrap()["createMovies"],
        json!({
            "__typename": "CreateMoviesMutationResponse",
            "movies": [{"title": "Heat"}],
            "info": {"nodesCreated": 1}
        })
    );
}

#[tokio::test]
async fn test_rolled_back_create_reports_required_relationship() {
    let service = service(CompilerConfig::default());
    let mut engine = MockEngine::new();
    engine.expect_run().times(1).returning(|_| {
        Err(ExecutionError::engine(
            "Failed to invoke procedure `apoc.util.validate`: Caused by: \
             java.lang.RuntimeException: @graphql-cypher/RELATIONSHIP-REQUIREDComment.post required",
        ))
    });

    let request = GraphRequest {
        kind: RequestKind::Mutation,
        fields: vec![RootField {
            operation: OperationKind::Create,
            node_type: "Comment".to_string(),
            selection: FieldSelection::new("createComments")
                .arg(
                    "input",
                    json!([{"comment_id": "c1", "post": {"connect": {"where": {"node": {"post_id": "nonexistent"}}}}}]),
                )
                .select(vec![FieldSelection::new("comments").select(leaves(&["comment_id"]))]),
        }],
        token: None,
    };
    let response = service.execute(&request, &engine).await;
    assert_eq!(response.data, None);
    assert_eq!(response.errors[0].message, "Comment.post required");
    assert_eq!(response.errors[0].code, "RELATIONSHIP_REQUIRED");
}

#[tokio::test]
async fn test_global_authentication_blocks_every_operation() {
    let service = service(CompilerConfig {
        global_authentication: true,
        ..Default::default()
    });
    let mut engine = MockEngine::new();
    engine.expect_run().times(0);

    for (operation, node_type, name) in [
        (OperationKind::Read, "Person", "people"),
        (OperationKind::Delete, "Person", "deletePeople"),
    ] {
        let request = GraphRequest {
            kind: RequestKind::Query,
            fields: vec![RootField {
                operation,
                node_type: node_type.to_string(),
                selection: FieldSelection::new(name),
            }],
            token: None,
        };
        let response = service.execute(&request, &engine).await;
        assert_eq!(response.data, None);
        assert_eq!(response.errors[0].code, "UNAUTHENTICATED");
    }
}

#[tokio::test]
async fn test_claims_flow_into_where_rules() {
    let service = service(CompilerConfig::default());
    let mut engine = MockEngine::new();
    engine
        .expect_run()
        .withf(|request| {
            request.access_mode == AccessMode::Read
                && request.statement.contains("this.owner = $this_auth_param0")
                && request.parameters["this_auth_param0"] == json!("u7")
        })
        .times(1)
        .returning(|_| Ok(ExecutionOutput::from_rows(single_row("this", json!({"value": "s"})))));

    let request = GraphRequest {
        kind: RequestKind::Query,
        fields: vec![RootField {
            operation: OperationKind::Read,
            node_type: "Secret".to_string(),
            selection: FieldSelection::new("secrets").select(leaves(&["value"])),
        }],
        token: Some(token(json!({"sub": "u7"}))),
    };
    let response = service.execute(&request, &engine).await;
    assert_eq!(response.data.unwrap()["secrets"], json!([{"value": "s"}]));
}

#[tokio::test]
async fn test_request_deserializes_from_json() {
    let request: GraphRequest = serde_json::from_value(json!({
        "kind": "query",
        "fields": [{
            "operation": "read",
            "nodeType": "Movie",
            "selection": {"name": "movies", "selections": [{"name": "title"}]}
        }]
    }))
    .unwrap();
    assert_eq!(request.fields[0].operation, OperationKind::Read);
    assert_eq!(request.token, None);

    let service = service(CompilerConfig::default());
    let compiled = service.translate(&request.fields[0], None).unwrap();
    assert!(compiled.statement.starts_with("MATCH (this:Movie)"));
}
