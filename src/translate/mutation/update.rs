use super::create::nodes_selection;
use super::{written_fields, BlockNames, RelatedMatch};
use crate::auth::forbidden_check;
use crate::cypher::{Statement, Subquery};
use crate::errors::TranslationError;
use crate::execution::AccessMode;
use crate::graph_catalog::{AuthOperation, NodeType, RelationshipField, TimestampOperation};
use crate::selection::{NestedUpdate, UpdateRequest};
use crate::translate::result_shape::{ResultShape, MUTATION_COLUMN};
use crate::translate::{CompiledStatement, Context, OperationKind, ROOT_VARIABLE};

/// `MATCH (this:L) WHERE … SET …`, relationship blocks in argument order,
/// post-write validations, then `RETURN collect(DISTINCT this {…}) AS data`.
pub(crate) fn compile(mut context: Context, request: &UpdateRequest) -> Result<CompiledStatement, TranslationError> {
    let node = context.schema.node(&request.node)?;
    let this = ROOT_VARIABLE;
    let written = written_fields(&request.properties);

    let mut statement = Statement::new();
    statement.match_pattern(&format!("({}{})", this, node.label_string()), &[this], &[]);
    context.filter_matched(
        &mut statement,
        node,
        request.filter.as_ref(),
        None,
        &written,
        this,
        AuthOperation::Update,
    )?;

    let mut assignments = context.assignments(node, this, &request.properties)?;
    if !request.properties.is_empty() {
        assignments.extend(context.timestamps(node, this, TimestampOperation::Update, &request.properties));
    }
    if !assignments.is_empty() {
        statement.set(&assignments, &[this]);
        statement.with(&[this]);
    }
    context.relationship_blocks(&mut statement, node, this, &request.relationships)?;
    for check in context.post_write_checks(node, this, &written, AuthOperation::Update)? {
        statement.procedure(&check, &[this]);
    }

    let selection = nodes_selection(&request.payload, &node.name);
    if let Some(allow) = context.allow_predicate(node, Some(&selection), &[], this, AuthOperation::Read)? {
        statement.procedure(&forbidden_check(&allow), &[this]);
    }
    let mut projection = context.project(node, &selection, this, Vec::new())?;
    projection.emit(&mut statement);
    statement.return_items(
        &format!("collect(DISTINCT {}) AS {}", projection.expression, MUTATION_COLUMN),
        &[MUTATION_COLUMN],
        &projection.scope(this),
    );

    let shape = ResultShape::Mutation {
        operation: OperationKind::Update,
        type_name: node.name.clone(),
        plural: node.plural.clone(),
        payload: request.payload.clone(),
    };
    context.finish(&statement, AccessMode::Write, shape)
}

impl<'a> Context<'a> {
    /// Update the related nodes (and their edges) matching the block's filters.
    pub fn nested_update(
        &mut self,
        relationship: &RelationshipField,
        target: &NodeType,
        parent: &str,
        names: &BlockNames,
        block: &NestedUpdate,
    ) -> Result<Subquery, TranslationError> {
        let written = block
            .node
            .as_ref()
            .map(|input| written_fields(&input.properties))
            .unwrap_or_default();
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
                operation: AuthOperation::Update,
                written,
            },
        )?;

        let mut assignments = Vec::new();
        if let Some(input) = &block.node {
            assignments.extend(self.assignments(target, &names.node, &input.properties)?);
            if !input.properties.is_empty() {
                assignments.extend(self.timestamps(target, &names.node, TimestampOperation::Update, &input.properties));
            }
        }
        if !block.edge.is_empty() {
            let edge = self.schema.relationship_properties(relationship)?.ok_or_else(|| {
                TranslationError::schema(format!("Relationship {} has no edge properties", relationship.name))
            })?;
            assignments.extend(self.assignments(edge, &names.edge, &block.edge)?);
        }
        if !assignments.is_empty() {
            body.set(&assignments, &[names.node.as_str(), names.edge.as_str()]);
        }
        if let Some(input) = &block.node {
            self.after_node_write(&mut body, target, &names.node, input, AuthOperation::Update)?;
        }

        body.return_items(&format!("count(*) AS {}", names.column), &[names.column.as_str()], &[]);
        Ok(Subquery::new(&[parent], body))
    }
}
