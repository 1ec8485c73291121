//! `where` predicate trees to Cypher boolean expressions.
//!
//! Values are always bound through the parameter table under the scope of
//! the variable being filtered, so nested filters get distinct names.

use crate::cypher::ParameterTable;
use crate::errors::TranslationError;
use crate::graph_catalog::{GraphSchema, NodeType, PropertyField, RelationshipField, RelationshipProperties};
use crate::selection::where_parser::FieldSource;
use crate::selection::{ConnectionPredicate, Operator, Quantifier, WherePredicate};

/// Property access, wrapped in `coalesce` when the field declares a
/// fallback value.
pub fn property_expression(property: &PropertyField, variable: &str, params: &mut ParameterTable) -> String {
    let access = format!("{}.{}", variable, property.db_name());
    match &property.coalesce_value {
        Some(value) => {
            let param = params.add(variable, value.clone());
            format!("coalesce({}, {})", access, param)
        }
        None => access,
    }
}

/// Join already-rendered predicates with AND; `None` when empty.
pub fn conjunction(parts: Vec<String>) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(parts.join(" AND ")),
    }
}

pub struct FilterCompiler<'a> {
    schema: &'a GraphSchema,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a GraphSchema) -> Self {
        FilterCompiler { schema }
    }

    pub fn compile(
        &self,
        source: &dyn FieldSource,
        predicate: &WherePredicate,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<String, TranslationError> {
        match predicate {
            WherePredicate::And(items) => self.group(source, items, " AND ", variable, params),
            WherePredicate::Or(items) => self.group(source, items, " OR ", variable, params),
            WherePredicate::Property {
                field,
                operator,
                value,
            } => {
                let property = source.property_field(field).ok_or_else(|| {
                    TranslationError::schema(format!("Unknown field `{}` on {}", field, source.source_name()))
                })?;
                let lhs = property_expression(property, variable, params);
                Ok(comparison(&lhs, *operator, value, variable, params))
            }
            WherePredicate::Relationship {
                field,
                target,
                quantifier,
                predicate,
            } => {
                let relationship = source.relationship_field(field).ok_or_else(|| {
                    TranslationError::schema(format!("Unknown field `{}` on {}", field, source.source_name()))
                })?;
                let target = self.schema.node(target)?;
                self.relationship(relationship, target, *quantifier, predicate.as_deref(), variable, params)
            }
        }
    }

    fn group(
        &self,
        source: &dyn FieldSource,
        items: &[WherePredicate],
        separator: &str,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<String, TranslationError> {
        if items.is_empty() {
            return Ok("true".to_string());
        }
        let parts = items
            .iter()
            .map(|item| self.compile(source, item, variable, params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(if parts.len() == 1 {
            parts.into_iter().collect()
        } else {
            format!("({})", parts.join(separator))
        })
    }

    fn relationship(
        &self,
        relationship: &RelationshipField,
        target: &NodeType,
        quantifier: Quantifier,
        predicate: Option<&WherePredicate>,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<String, TranslationError> {
        let pattern = relationship.pattern(None);
        let predicate = match predicate {
            Some(predicate) => predicate,
            None => {
                let comparison = if quantifier == Quantifier::None { "= 0" } else { "> 0" };
                return Ok(format!(
                    "size([({}){}({}) | 1]) {}",
                    variable,
                    pattern,
                    target.label_string(),
                    comparison
                ));
            }
        };

        let related = if relationship.is_union() {
            format!("{}_{}_{}_where", variable, relationship.name, target.name)
        } else {
            format!("{}_{}_where", variable, relationship.name)
        };
        let inner = self.compile(target, predicate, &related, params)?;
        let function = match quantifier {
            Quantifier::Some => "any",
            Quantifier::None => "none",
            Quantifier::All => "all",
            Quantifier::Single => "single",
        };
        Ok(format!(
            "{f}({rel} IN [({var}){pattern}({rel}{labels}) | {rel}] WHERE {inner})",
            f = function,
            rel = related,
            var = variable,
            pattern = pattern,
            labels = target.label_string(),
            inner = inner
        ))
    }

    /// Filter over a connection's related node and edge variables.
    pub fn connection(
        &self,
        target: &NodeType,
        edge: Option<&RelationshipProperties>,
        predicate: &ConnectionPredicate,
        node_variable: &str,
        edge_variable: &str,
        params: &mut ParameterTable,
    ) -> Result<String, TranslationError> {
        let (text, negated) = match predicate {
            ConnectionPredicate::And(items) | ConnectionPredicate::Or(items) => {
                if items.is_empty() {
                    return Ok("true".to_string());
                }
                let separator = if matches!(predicate, ConnectionPredicate::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                let parts = items
                    .iter()
                    .map(|item| self.connection(target, edge, item, node_variable, edge_variable, params))
                    .collect::<Result<Vec<_>, _>>()?;
                (format!("({})", parts.join(separator)), false)
            }
            ConnectionPredicate::Node { predicate, negated } => {
                (self.compile(target, predicate, node_variable, params)?, *negated)
            }
            ConnectionPredicate::Edge { predicate, negated } => {
                let edge = edge.ok_or_else(|| {
                    TranslationError::schema(format!("Relationship to {} has no edge properties", target.name))
                })?;
                (self.compile(edge, predicate, edge_variable, params)?, *negated)
            }
        };
        Ok(if negated { format!("(NOT {})", text) } else { text })
    }
}

fn comparison(
    lhs: &str,
    operator: Operator,
    value: &serde_json::Value,
    scope: &str,
    params: &mut ParameterTable,
) -> String {
    if value.is_null() {
        match operator {
            Operator::Equals => return format!("{} IS NULL", lhs),
            Operator::NotEquals => return format!("{} IS NOT NULL", lhs),
            _ => {}
        }
    }
    let param = params.add(scope, value.clone());
    match operator {
        Operator::Equals => format!("{} = {}", lhs, param),
        Operator::NotEquals => format!("(NOT {} = {})", lhs, param),
        Operator::In => format!("{} IN {}", lhs, param),
        Operator::NotIn => format!("(NOT {} IN {})", lhs, param),
        Operator::Lt => format!("{} < {}", lhs, param),
        Operator::Lte => format!("{} <= {}", lhs, param),
        Operator::Gt => format!("{} > {}", lhs, param),
        Operator::Gte => format!("{} >= {}", lhs, param),
        Operator::Contains => format!("{} CONTAINS {}", lhs, param),
        Operator::NotContains => format!("(NOT {} CONTAINS {})", lhs, param),
        Operator::StartsWith => format!("{} STARTS WITH {}", lhs, param),
        Operator::NotStartsWith => format!("(NOT {} STARTS WITH {})", lhs, param),
        Operator::EndsWith => format!("{} ENDS WITH {}", lhs, param),
        Operator::NotEndsWith => format!("(NOT {} ENDS WITH {})", lhs, param),
        Operator::Matches => format!("{} =~ {}", lhs, param),
        Operator::Includes => format!("{} IN {}", param, lhs),
        Operator::NotIncludes => format!("(NOT {} IN {})", param, lhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::testing::test_schema;
    use crate::selection::where_parser::parse_where;
    use serde_json::json;
    use test_case::test_case;

    fn compile(type_name: &str, filter: serde_json::Value) -> (String, ParameterTable) {
        let schema = test_schema();
        let node = schema.node(type_name).unwrap();
        let predicate = parse_where(&schema, node, &filter).unwrap();
        let mut params = ParameterTable::new();
        let text = FilterCompiler::new(&schema)
            .compile(node, &predicate, "this", &mut params)
            .unwrap();
        (text, params)
    }

    #[test_case(json!({"title": "A"}), "this.title = $this_param0"; "equals")]
    #[test_case(json!({"title_NOT": "A"}), "(NOT this.title = $this_param0)"; "not equals")]
    #[test_case(json!({"released_IN": [1, 2]}), "this.released IN $this_param0"; "in list")]
    #[test_case(json!({"released_GTE": 1999}), "this.released >= $this_param0"; "gte")]
    #[test_case(json!({"title_STARTS_WITH": "The"}), "this.title STARTS WITH $this_param0"; "starts with")]
    #[test_case(json!({"title_MATCHES": "(?i)the.*"}), "this.title =~ $this_param0"; "regex")]
    #[test_case(json!({"tags_INCLUDES": "action"}), "$this_param0 IN this.tags"; "includes")]
    #[test_case(json!({"budget_LT": 10}), "this.budget_usd < $this_param0"; "database property name")]
    fn test_operator_rendering(filter: serde_json::Value, expected: &str) {
        let (text, params) = compile("Movie", filter);
        assert_eq!(text, expected);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_null_comparisons_bind_nothing() {
        let (text, params) = compile("Movie", json!({"title": null}));
        assert_eq!(text, "this.title IS NULL");
        assert!(params.is_empty());
        let (text, _) = compile("Movie", json!({"title_NOT": null}));
        assert_eq!(text, "this.title IS NOT NULL");
    }

    #[test]
    fn test_coalesce_fallback_is_bound() {
        let (text, params) = compile("Movie", json!({"rating_GT": 3}));
        assert_eq!(text, "coalesce(this.rating, $this_param0) > $this_param1");
        assert_eq!(params.get("this_param0"), Some(&json!(0)));
        assert_eq!(params.get("this_param1"), Some(&json!(3)));
    }

    #[test]
    fn test_logical_groups() {
        let (text, _) = compile(
            "Movie",
            json!({"OR": [{"title": "A"}, {"released_LT": 2000}], "tags_NOT_INCLUDES": "x"}),
        );
        assert_eq!(
            text,
            "((this.title = $this_param0 OR this.released < $this_param1) AND (NOT $this_param2 IN this.tags))"
        );
    }

    #[test]
    fn test_relationship_quantifiers() {
        let (text, params) = compile("Movie", json!({"actors_ALL": {"born_GT": 1960}}));
        assert_eq!(
            text,
            "all(this_actors_where IN [(this)<-[:ACTED_IN]-(this_actors_where:Actor) | this_actors_where] \
             WHERE this_actors_where.born > $this_actors_where_param0)"
        );
        assert_eq!(params.get("this_actors_where_param0"), Some(&json!(1960)));

        let (text, _) = compile("Movie", json!({"director": null}));
        assert_eq!(text, "size([(this)<-[:DIRECTED]-(:Person) | 1]) = 0");
    }

    #[test]
    fn test_filter_literals_are_never_inlined() {
        let (text, params) = compile("Actor", json!({"name_CONTAINS": "' OR 1=1 //", "movies_SOME": {"title": "x"}}));
        assert!(!text.contains("OR 1=1"));
        assert!(!text.contains("'x'"));
        assert_eq!(params.len(), 2);
    }
}
