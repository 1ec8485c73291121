use super::{BlockNames, RelatedMatch};
use crate::cypher::{Statement, Subquery};
use crate::errors::TranslationError;
use crate::execution::AccessMode;
use crate::graph_catalog::{AuthOperation, NodeType, RelationshipField};
use crate::selection::{DeleteRequest, NestedDelete};
use crate::translate::result_shape::ResultShape;
use crate::translate::{CompiledStatement, Context, OperationKind, ROOT_VARIABLE};

/// `MATCH (this:L) WHERE …`, cascaded deletes, then `DETACH DELETE this`.
/// The response is built from the engine's counters alone.
pub(crate) fn compile(mut context: Context, request: &DeleteRequest) -> Result<CompiledStatement, TranslationError> {
    let node = context.schema.node(&request.node)?;
    let this = ROOT_VARIABLE;

    let mut statement = Statement::new();
    statement.match_pattern(&format!("({}{})", this, node.label_string()), &[this], &[]);
    context.filter_matched(
        &mut statement,
        node,
        request.filter.as_ref(),
        None,
        &[],
        this,
        AuthOperation::Delete,
    )?;
    context.relationship_blocks(&mut statement, node, this, &request.cascade)?;
    statement.delete(&[this], true);

    let shape = ResultShape::Mutation {
        operation: OperationKind::Delete,
        type_name: node.name.clone(),
        plural: node.plural.clone(),
        payload: request.payload.clone(),
    };
    context.finish(&statement, AccessMode::Write, shape)
}

impl<'a> Context<'a> {
    pub fn nested_delete(
        &mut self,
        relationship: &RelationshipField,
        target: &NodeType,
        parent: &str,
        names: &BlockNames,
        block: &NestedDelete,
    ) -> Result<Subquery, TranslationError> {
        let mut body = Statement::new();
        self.match_related(
            &mut body,
            relationship,
            target,
            parent,
            names,
            RelatedMatch {
                node_filter: block.node_filter.as_ref(),
                edge_filter: None,
                operation: AuthOperation::Delete,
                written: Vec::new(),
            },
        )?;
        if !block.delete.is_empty() {
            body.with(&[names.node.as_str()]);
            self.relationship_blocks(&mut body, target, &names.node, &block.delete)?;
        }
        body.delete(&[names.node.as_str()], true);
        body.return_items(&format!("count(*) AS {}", names.column), &[names.column.as_str()], &[]);
        Ok(Subquery::new(&[parent], body))
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::Claims;
    use crate::errors::TranslationError;
    use crate::graph_catalog::testing::test_schema;
    use crate::selection::FieldSelection;
    use crate::translate::{OperationKind, Translator};
    use serde_json::json;

    #[test]
    fn test_delete_with_cascade() {
        let schema = test_schema();
        let translator = Translator::new(&schema, None, 16);
        let field = FieldSelection::new("deletePosts")
            .arg("where", json!({"post_id": "p1"}))
            .arg("delete", json!({"comments": {"where": {"node": {"text_CONTAINS": "spam"}}}}))
            .select(vec![FieldSelection::new("nodesDeleted")]);
        let compiled = translator.translate(OperationKind::Delete, "Post", &field).unwrap();
        assert_eq!(
            compiled.statement,
            "MATCH (this:Post)\n\
             WHERE this.post_id = $this_param0\n\
             CALL {\n\
             \x20   WITH this\n\
             \x20   MATCH (this)<-[this_comments0_relationship:HAS_POST]-(this_comments0_node:Comment)\n\
             \x20   WHERE this_comments0_node.text CONTAINS $this_comments0_node_param0\n\
             \x20   DETACH DELETE this_comments0_node\n\
             \x20   RETURN count(*) AS this_comments0\n\
             }\n\
             DETACH DELETE this"
        );
        assert_eq!(compiled.access_mode, crate::execution::AccessMode::Write);
    }

    #[test]
    fn test_delete_rules_are_alternatives() {
        let schema = test_schema();
        let field = FieldSelection::new("deleteUsers")
            .arg("where", json!({"id": "u1"}))
            .select(vec![FieldSelection::new("nodesDeleted")]);

        let admin = Claims::from_payload(json!({"sub": "u9", "roles": ["admin"]}), "roles");
        let translator = Translator::new(&schema, Some(&admin), 16);
        let compiled = translator.translate(OperationKind::Delete, "User", &field).unwrap();
        assert!(!compiled.statement.contains("apoc.util.validate"));
        assert!(compiled.statement.ends_with("DETACH DELETE this"));

        let reader = Claims::from_payload(json!({"sub": "u1", "roles": ["reader"]}), "roles");
        let translator = Translator::new(&schema, Some(&reader), 16);
        let compiled = translator.translate(OperationKind::Delete, "User", &field).unwrap();
        assert!(compiled.statement.contains(
            "CALL apoc.util.validate(NOT ((this.id IS NOT NULL AND this.id = $this_auth_param0)), \
             '@graphql-cypher/FORBIDDEN', [0])"
        ));
    }

    #[test]
    fn test_anonymous_delete_is_unauthenticated() {
        let schema = test_schema();
        let translator = Translator::new(&schema, None, 16);
        let field = FieldSelection::new("deleteUsers").select(vec![FieldSelection::new("nodesDeleted")]);
        assert!(matches!(
            translator.translate(OperationKind::Delete, "User", &field),
            Err(TranslationError::Authentication(_))
        ));
    }
}
