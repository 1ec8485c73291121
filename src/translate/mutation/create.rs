use super::integrity::check_create_input;
use super::{written_fields, BlockNames};
use crate::cypher::{Statement, Subquery};
use crate::errors::TranslationError;
use crate::execution::AccessMode;
use crate::graph_catalog::{AuthOperation, NodeType, RelationshipField, TimestampOperation};
use crate::selection::{MutationRequest, NestedCreate, NodeInput, NodeSelection, PayloadField};
use crate::translate::result_shape::{ResultShape, MUTATION_COLUMN};
use crate::translate::{CompiledStatement, Context, OperationKind, ROOT_VARIABLE};

/// One uncorrelated `CALL { CREATE … RETURN thisN }` per input element,
/// then `RETURN [this0 {…}, …] AS data`.
pub(crate) fn compile(mut context: Context, request: &MutationRequest) -> Result<CompiledStatement, TranslationError> {
    let node = context.schema.node(&request.node)?;
    let selection = nodes_selection(&request.payload, &node.name);
    let variables: Vec<String> = (0..request.inputs.len())
        .map(|i| format!("{}{}", ROOT_VARIABLE, i))
        .collect();

    let mut statement = Statement::new();
    for (input, variable) in request.inputs.iter().zip(&variables) {
        check_create_input(node, input)?;
        let mut body = Statement::new();
        context.create_node(&mut body, node, variable, input)?;
        body.return_items(variable, &[variable.as_str()], &[variable.as_str()]);
        statement.call(Subquery::new(&[], body));
    }

    let mut projections = Vec::with_capacity(variables.len());
    for variable in &variables {
        projections.push(context.project(node, &selection, variable, Vec::new())?);
    }
    let mut scope: Vec<&str> = variables.iter().map(String::as_str).collect();
    if projections.iter().any(|p| !p.subqueries.is_empty()) {
        statement.with(&scope);
    }
    for projection in &mut projections {
        projection.emit(&mut statement);
    }
    scope.extend(projections.iter().flat_map(|p| p.columns.iter().map(String::as_str)));
    let items = projections
        .iter()
        .map(|p| p.expression.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    statement.return_items(
        &format!("[{}] AS {}", items, MUTATION_COLUMN),
        &[MUTATION_COLUMN],
        &scope,
    );

    let shape = ResultShape::Mutation {
        operation: OperationKind::Create,
        type_name: node.name.clone(),
        plural: node.plural.clone(),
        payload: request.payload.clone(),
    };
    context.finish(&statement, AccessMode::Write, shape)
}

/// Selection of the payload's node list, or an empty one.
pub(crate) fn nodes_selection(payload: &[PayloadField], type_name: &str) -> NodeSelection {
    payload
        .iter()
        .find_map(|field| match field {
            PayloadField::Nodes { selection, .. } => Some(selection.clone()),
            _ => None,
        })
        .unwrap_or_else(|| NodeSelection {
            type_name: type_name.to_string(),
            fields: Vec::new(),
        })
}

impl<'a> Context<'a> {
    /// `CREATE (var:L) SET …`, nested blocks, then the post-write checks.
    /// Leaves `variable` in scope.
    pub fn create_node(
        &mut self,
        body: &mut Statement,
        node: &NodeType,
        variable: &str,
        input: &NodeInput,
    ) -> Result<(), TranslationError> {
        body.create(&format!("({}{})", variable, node.label_string()), &[variable], &[]);
        let assignments = self.create_assignments(node, variable, input)?;
        if !assignments.is_empty() {
            body.set(&assignments, &[variable]);
        }
        self.after_node_write(body, node, variable, input, AuthOperation::Create)
    }

    /// Nested blocks of `input` followed by bind and integrity validations.
    /// Starts with `WITH variable` when anything follows the write.
    pub fn after_node_write(
        &mut self,
        body: &mut Statement,
        node: &NodeType,
        variable: &str,
        input: &NodeInput,
        operation: AuthOperation,
    ) -> Result<(), TranslationError> {
        let written = written_fields(&input.properties);
        let checks = self.post_write_checks(node, variable, &written, operation)?;
        if input.relationships.is_empty() && checks.is_empty() {
            return Ok(());
        }
        body.with(&[variable]);
        self.relationship_blocks(body, node, variable, &input.relationships)?;
        for check in checks {
            body.procedure(&check, &[variable]);
        }
        Ok(())
    }

    /// Explicit values plus generated ids, creation timestamps and declared
    /// defaults for absent fields.
    fn create_assignments(
        &mut self,
        node: &NodeType,
        variable: &str,
        input: &NodeInput,
    ) -> Result<Vec<String>, TranslationError> {
        let mut assignments = self.assignments(node, variable, &input.properties)?;
        for property in &node.properties {
            if input.property(&property.name).is_some() {
                continue;
            }
            let target = format!("{}.{}", variable, property.db_name());
            if property.autogenerate {
                assignments.push(format!("{} = randomUUID()", target));
            } else if property.timestamps.contains(&TimestampOperation::Create) {
                assignments.push(format!("{} = datetime()", target));
            } else if let Some(default) = &property.default_value {
                let param = self
                    .params
                    .add_named(&format!("{}_{}", variable, property.name), default.clone());
                assignments.push(format!("{} = {}", target, param));
            } else if property.required {
                return Err(TranslationError::schema(format!(
                    "Field {}.{} is required",
                    node.name, property.name
                )));
            }
        }
        Ok(assignments)
    }

    /// `CALL { WITH parent CREATE (node:L) … CREATE (parent)-[:T]->(node) … RETURN count(*) AS b }`
    pub fn nested_create(
        &mut self,
        relationship: &RelationshipField,
        target: &NodeType,
        parent: &str,
        names: &BlockNames,
        block: &NestedCreate,
    ) -> Result<Subquery, TranslationError> {
        check_create_input(target, &block.node)?;
        let mut body = Statement::new();
        body.create(&format!("({}{})", names.node, target.label_string()), &[names.node.as_str()], &[]);
        let mut assignments = self.create_assignments(target, &names.node, &block.node)?;
        body.create(
            &format!("({}){}({})", parent, relationship.pattern(Some(&names.edge)), names.node),
            &[names.edge.as_str()],
            &[parent, names.node.as_str()],
        );
        if !block.edge.is_empty() {
            let edge = self.schema.relationship_properties(relationship)?.ok_or_else(|| {
                TranslationError::schema(format!("Relationship {} has no edge properties", relationship.name))
            })?;
            assignments.extend(self.assignments(edge, &names.edge, &block.edge)?);
        }
        if !assignments.is_empty() {
            body.set(&assignments, &[names.node.as_str()]);
        }
        self.after_node_write(&mut body, target, &names.node, &block.node, AuthOperation::Create)?;
        body.return_items(
            &format!("count(*) AS {}", names.column),
            &[names.column.as_str()],
            &[],
        );
        Ok(Subquery::new(&[parent], body))
    }
}
