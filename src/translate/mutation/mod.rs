//! Mutation planner.
//!
//! Root operations live in `create`, `update` and `delete`. Nested blocks
//! are compiled by exhaustive matching on [`MutationBlock`]; every block
//! becomes one correlated `CALL { WITH parent ... RETURN count(*) AS b }`
//! so blocks run in input order and never change the outer row count.

pub mod connect;
pub mod create;
pub mod delete;
pub mod integrity;
pub mod update;

use super::filter::conjunction;
use super::Context;
use crate::auth::{forbidden_check, RuleKind};
use crate::cypher::Statement;
use crate::errors::TranslationError;
use crate::graph_catalog::{AuthOperation, NodeType, RelationshipField, TimestampOperation};
use crate::selection::where_parser::FieldSource;
use crate::selection::{MutationBlock, PropertyWrite, RelationshipInput, WherePredicate, WriteOperation};

/// Variables of one nested block: `<parent>_<field><n>` plus its node and
/// relationship variables.
pub(crate) struct BlockNames {
    pub column: String,
    pub node: String,
    pub edge: String,
}


/// Filters applied to the far side of a relationship before a nested block
/// acts on it.
pub(crate) struct RelatedMatch<'r> {
    pub node_filter: Option<&'r WherePredicate>,
    pub edge_filter: Option<&'r WherePredicate>,
    pub operation: AuthOperation,
    /// Properties the block writes to the related node
    pub written: Vec<&'r str>,
}

impl<'a> Context<'a> {
    /// Compile every block of `inputs` against the node bound to `variable`.
    pub fn relationship_blocks(
        &mut self,
        body: &mut Statement,
        node: &NodeType,
        variable: &str,
        inputs: &[RelationshipInput],
    ) -> Result<(), TranslationError> {
        let mut index = 0;
        for input in inputs {
            let relationship = node.relationship(&input.field).ok_or_else(|| {
                TranslationError::schema(format!("Unknown field `{}` on {}", input.field, node.name))
            })?;
            let target = self.schema.node(&input.target)?;
            for block in &input.blocks {
                let names = self.block_names(variable, &input.field, index);
                index += 1;
                let subquery = match block {
                    MutationBlock::Create(create) => {
                        self.nested_create(relationship, target, variable, &names, create)?
                    }
                    MutationBlock::Connect(connect) => {
                        self.nested_connect(node, relationship, target, variable, &names, connect)?
                    }
                    MutationBlock::Disconnect(disconnect) => {
                        self.nested_disconnect(node, relationship, target, variable, &names, disconnect)?
                    }
                    MutationBlock::Update(update) => {
                        self.nested_update(relationship, target, variable, &names, update)?
                    }
                    MutationBlock::Delete(delete) => {
                        self.nested_delete(relationship, target, variable, &names, delete)?
                    }
                };
                body.call(subquery);
            }
        }
        Ok(())
    }

    fn block_names(&mut self, parent: &str, field: &str, index: usize) -> BlockNames {
        let column = self.reserve_variable(format!("{}_{}{}", parent, field, index));
        BlockNames {
            node: self.reserve_variable(format!("{}_node", column)),
            edge: self.reserve_variable(format!("{}_relationship", column)),
            column,
        }
    }

    /// `MATCH (parent)-[edge:T]->(node:L) WHERE …` plus the `allow`
    /// validation for the related node.
    pub fn match_related(
        &mut self,
        body: &mut Statement,
        relationship: &RelationshipField,
        target: &NodeType,
        parent: &str,
        names: &BlockNames,
        related: RelatedMatch,
    ) -> Result<(), TranslationError> {
        let edge_source = self.schema.relationship_properties(relationship)?;
        body.match_pattern(
            &format!(
                "({}){}({}{})",
                parent,
                relationship.pattern(Some(&names.edge)),
                names.node,
                target.label_string()
            ),
            &[names.node.as_str(), names.edge.as_str()],
            &[parent],
        );

        let auth_where = self.auth.node_predicate(
            target,
            related.operation,
            RuleKind::Where,
            &names.node,
            &mut self.params,
        )?;
        let allow = self.allow_predicate(target, None, &related.written, &names.node, related.operation)?;

        let mut conditions = Vec::new();
        if let Some(filter) = related.node_filter {
            conditions.push(self.filters.compile(target, filter, &names.node, &mut self.params)?);
        }
        if let Some(filter) = related.edge_filter {
            let source = edge_source.ok_or_else(|| {
                TranslationError::schema(format!("Relationship {} has no edge properties", relationship.name))
            })?;
            conditions.push(self.filters.compile(source, filter, &names.edge, &mut self.params)?);
        }
        conditions.extend(auth_where);
        if let Some(condition) = conjunction(conditions) {
            body.where_clause(&condition, &[names.node.as_str(), names.edge.as_str()]);
        }
        if let Some(allow) = allow {
            body.procedure(&forbidden_check(&allow), &[names.node.as_str()]);
        }
        Ok(())
    }

    /// `SET` assignments for explicit property writes.
    pub fn assignments(
        &mut self,
        source: &dyn FieldSource,
        variable: &str,
        writes: &[PropertyWrite],
    ) -> Result<Vec<String>, TranslationError> {
        let mut assignments = Vec::with_capacity(writes.len());
        for write in writes {
            let property = source.property_field(&write.field).ok_or_else(|| {
                TranslationError::schema(format!("Unknown field `{}` on {}", write.field, source.source_name()))
            })?;
            let target = format!("{}.{}", variable, property.db_name());
            let param = self
                .params
                .add_named(&format!("{}_{}", variable, write.field), write.value.clone());
            assignments.push(match write.operation {
                WriteOperation::Set => format!("{} = {}", target, param),
                WriteOperation::Increment => format!("{t} = {t} + {p}", t = target, p = param),
                WriteOperation::Decrement => format!("{t} = {t} - {p}", t = target, p = param),
                WriteOperation::Push => format!("{t} = coalesce({t}, []) + {p}", t = target, p = param),
                WriteOperation::Pop => format!("{t} = {t}[0..size({t}) - {p}]", t = target, p = param),
            });
        }
        Ok(assignments)
    }

    /// `datetime()` for every property stamped on `operation`, unless the
    /// caller wrote it explicitly.
    pub fn timestamps(
        &self,
        node: &NodeType,
        variable: &str,
        operation: TimestampOperation,
        writes: &[PropertyWrite],
    ) -> Vec<String> {
        node.properties
            .iter()
            .filter(|p| p.timestamps.contains(&operation))
            .filter(|p| !writes.iter().any(|w| w.field == p.name))
            .map(|p| format!("{}.{} = datetime()", variable, p.db_name()))
            .collect()
    }

    /// Post-write validations for a node written under `operation`: the
    /// `bind` rule for the written fields, then required relationships.
    pub fn post_write_checks(
        &mut self,
        node: &NodeType,
        variable: &str,
        written: &[&str],
        operation: AuthOperation,
    ) -> Result<Vec<String>, TranslationError> {
        let mut checks = Vec::new();
        if operation == AuthOperation::Create {
            if let Some(allow) = self.allow_predicate(node, None, written, variable, operation)? {
                checks.push(forbidden_check(&allow));
            }
        }
        if let Some(bind) = self.bind_predicate(node, written, variable, operation)? {
            checks.push(forbidden_check(&bind));
        }
        checks.extend(self.required_relationship_checks(node, variable)?);
        Ok(checks)
    }
}

/// Field names of a write list.
pub(crate) fn written_fields(writes: &[PropertyWrite]) -> Vec<&str> {
    writes.iter().map(|w| w.field.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::testing::test_schema;
    use serde_json::json;

    #[test]
    fn test_write_operations() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        let mut context = Context::new(&schema, None);
        let writes = vec![
            PropertyWrite {
                field: "released".to_string(),
                operation: WriteOperation::Increment,
                value: json!(1),
            },
            PropertyWrite {
                field: "tags".to_string(),
                operation: WriteOperation::Push,
                value: json!(["new"]),
            },
            PropertyWrite {
                field: "budget".to_string(),
                operation: WriteOperation::Set,
                value: json!(10),
            },
        ];
        let assignments = context.assignments(movie, "this", &writes).unwrap();
        assert_eq!(
            assignments,
            vec![
                "this.released = this.released + $this_released",
                "this.tags = coalesce(this.tags, []) + $this_tags",
                "this.budget_usd = $this_budget",
            ]
        );
        assert_eq!(
            context.timestamps(movie, "this", TimestampOperation::Update, &writes),
            vec!["this.updatedAt = datetime()"]
        );
    }

    #[test]
    fn test_block_names() {
        let schema = test_schema();
        let mut context = Context::new(&schema, None);
        let names = context.block_names("this0", "actors", 1);
        assert_eq!(names.column, "this0_actors1");
        assert_eq!(names.node, "this0_actors1_node");
        assert_eq!(names.edge, "this0_actors1_relationship");

        let again = context.block_names("this0", "actors", 1);
        assert_eq!(again.column, "this0_actors1_1");
        assert_eq!(again.node, "this0_actors1_1_node");
    }

    #[test]
    fn test_alias_matching_block_column_gets_own_variable() {
        use crate::selection::{leaves, FieldSelection};
        use crate::translate::{OperationKind, Translator};

        let schema = test_schema();
        let field = FieldSelection::new("updateMovies")
            .arg("connect", json!({"actors": [{"where": {"node": {"name": "Keanu"}}}]}))
            .select(vec![FieldSelection::new("movies").select(vec![FieldSelection::new("actors")
                .alias("actors0")
                .select(leaves(&["name"]))])]);
        let compiled = Translator::new(&schema, None, 16)
            .translate(OperationKind::Update, "Movie", &field)
            .unwrap();
        let text = &compiled.statement;
        assert_eq!(text.matches("RETURN count(*) AS this_actors0\n").count(), 1);
        assert!(text.contains("AS this_actors0_1\n"));
        assert!(text.ends_with("RETURN collect(DISTINCT this { actors0: this_actors0_1 }) AS data"));
    }
}
