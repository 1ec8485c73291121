use super::result_shape::ResultShape;
use super::{CompiledStatement, Context, ROOT_VARIABLE};
use crate::cypher::Statement;
use crate::errors::TranslationError;
use crate::graph_catalog::AuthOperation;
use crate::selection::ReadRequest;

/// Compile a root read into
/// `MATCH (this:L) WHERE … [allow] [WITH this ORDER BY … SKIP … LIMIT …] CALL {…}… RETURN this {…} AS this`.
pub(crate) fn compile(mut context: Context, request: &ReadRequest) -> Result<CompiledStatement, TranslationError> {
    let node = context.schema.node(&request.node)?;
    let this = ROOT_VARIABLE;

    let mut statement = Statement::new();
    statement.match_pattern(&format!("({}{})", this, node.label_string()), &[this], &[]);
    context.filter_matched(
        &mut statement,
        node,
        request.filter.as_ref(),
        Some(&request.selection),
        &[],
        this,
        AuthOperation::Read,
    )?;
    context.paginate(&mut statement, Some(node), &request.options, this)?;

    let mut projection = context.project(node, &request.selection, this, Vec::new())?;
    projection.emit(&mut statement);
    statement.return_items(
        &format!("{} AS {}", projection.expression, this),
        &[this],
        &projection.scope(this),
    );

    let shape = ResultShape::Nodes {
        column: this.to_string(),
        selection: request.selection.clone(),
    };
    context.finish(&statement, crate::execution::AccessMode::Read, shape)
}
