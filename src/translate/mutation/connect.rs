use super::{BlockNames, RelatedMatch};
use crate::auth::forbidden_check;
use crate::cypher::{Statement, Subquery};
use crate::errors::TranslationError;
use crate::graph_catalog::{AuthOperation, NodeType, RelationshipField};
use crate::selection::{NestedConnect, NestedDisconnect};
use crate::translate::Context;

impl<'a> Context<'a> {
    /// `MATCH (node:L) WHERE … MERGE (parent)-[edge:T]->(node)`, followed by
    /// any connections made from the connected node.
    pub fn nested_connect(
        &mut self,
        node: &NodeType,
        relationship: &RelationshipField,
        target: &NodeType,
        parent: &str,
        names: &BlockNames,
        block: &NestedConnect,
    ) -> Result<Subquery, TranslationError> {
        let mut body = Statement::new();
        body.match_pattern(
            &format!("({}{})", names.node, target.label_string()),
            &[names.node.as_str()],
            &[],
        );
        self.filter_matched(
            &mut body,
            target,
            block.filter.as_ref(),
            None,
            &[],
            &names.node,
            AuthOperation::Connect,
        )?;
        if let Some(allow) = self.allow_predicate(node, None, &[], parent, AuthOperation::Connect)? {
            body.procedure(&forbidden_check(&allow), &[parent]);
        }

        body.merge(
            &format!("({}){}({})", parent, relationship.pattern(Some(&names.edge)), names.node),
            &[names.edge.as_str()],
            &[parent, names.node.as_str()],
        );
        if !block.edge.is_empty() {
            let edge = self.schema.relationship_properties(relationship)?.ok_or_else(|| {
                TranslationError::schema(format!("Relationship {} has no edge properties", relationship.name))
            })?;
            let assignments = self.assignments(edge, &names.edge, &block.edge)?;
            body.set(&assignments, &[names.edge.as_str()]);
        }

        let bind = self.bind_predicate(target, &[], &names.node, AuthOperation::Connect)?;
        let required = self.required_relationship_checks(target, &names.node)?;
        if !block.connect.is_empty() || bind.is_some() || !required.is_empty() {
            body.with(&[names.node.as_str()]);
            self.relationship_blocks(&mut body, target, &names.node, &block.connect)?;
            if let Some(bind) = bind {
                body.procedure(&forbidden_check(&bind), &[names.node.as_str()]);
            }
            for check in required {
                body.procedure(&check, &[names.node.as_str()]);
            }
        }

        body.return_items(&format!("count(*) AS {}", names.column), &[names.column.as_str()], &[]);
        Ok(Subquery::new(&[parent], body))
    }

    /// Delete the matching relationships; both endpoints stay, and the
    /// disconnected node must still satisfy its required relationships.
    pub fn nested_disconnect(
        &mut self,
        node: &NodeType,
        relationship: &RelationshipField,
        target: &NodeType,
        parent: &str,
        names: &BlockNames,
        block: &NestedDisconnect,
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
                edge_filter: block.edge_filter.as_ref(),
                operation: AuthOperation::Disconnect,
                written: Vec::new(),
            },
        )?;
        if let Some(allow) = self.allow_predicate(node, None, &[], parent, AuthOperation::Disconnect)? {
            body.procedure(&forbidden_check(&allow), &[parent]);
        }
        body.delete(&[names.edge.as_str()], false);
        let required = self.required_relationship_checks(target, &names.node)?;
        if !required.is_empty() {
            body.with(&[names.node.as_str()]);
            for check in required {
                body.procedure(&check, &[names.node.as_str()]);
            }
        }
        body.return_items(&format!("count(*) AS {}", names.column), &[names.column.as_str()], &[]);
        Ok(Subquery::new(&[parent], body))
    }
}
