//! Parses `where` argument objects into a closed predicate tree.
//!
//! Keys are resolved against the fields of the node (or edge) they filter:
//! a bare field name is equality (or relationship `SOME`), and a field name
//! followed by an operator suffix such as `_IN` or `_NONE` selects that
//! operator. Anything that does not resolve is a schema mismatch.

use serde_json::{Map, Value};

use crate::errors::TranslationError;
use crate::graph_catalog::{GraphSchema, NodeType, PropertyField, RelationshipField, RelationshipProperties};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    /// List property contains the value
    Includes,
    NotIncludes,
}

/// Longest suffixes first so `_NOT_IN` wins over `_IN`.
const PROPERTY_SUFFIXES: &[(&str, Operator)] = &[
    ("_NOT_STARTS_WITH", Operator::NotStartsWith),
    ("_NOT_ENDS_WITH", Operator::NotEndsWith),
    ("_NOT_CONTAINS", Operator::NotContains),
    ("_NOT_INCLUDES", Operator::NotIncludes),
    ("_STARTS_WITH", Operator::StartsWith),
    ("_ENDS_WITH", Operator::EndsWith),
    ("_CONTAINS", Operator::Contains),
    ("_INCLUDES", Operator::Includes),
    ("_MATCHES", Operator::Matches),
    ("_NOT_IN", Operator::NotIn),
    ("_NOT", Operator::NotEquals),
    ("_LTE", Operator::Lte),
    ("_GTE", Operator::Gte),
    ("_IN", Operator::In),
    ("_LT", Operator::Lt),
    ("_GT", Operator::Gt),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    None,
    All,
    Single,
}

const RELATIONSHIP_SUFFIXES: &[(&str, Quantifier)] = &[
    ("_SINGLE", Quantifier::Single),
    ("_SOME", Quantifier::Some),
    ("_NONE", Quantifier::None),
    ("_NOT", Quantifier::None),
    ("_ALL", Quantifier::All),
];

#[derive(Debug, Clone, PartialEq)]
pub enum WherePredicate {
    And(Vec<WherePredicate>),
    Or(Vec<WherePredicate>),
    Property {
        field: String,
        operator: Operator,
        value: Value,
    },
    /// Filter on related nodes of one concrete target type. `predicate` is
    /// `None` for pure existence checks (`rel: null`).
    Relationship {
        field: String,
        target: String,
        quantifier: Quantifier,
        predicate: Option<Box<WherePredicate>>,
    },
}

/// Filter over a connection's edges.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionPredicate {
    And(Vec<ConnectionPredicate>),
    Or(Vec<ConnectionPredicate>),
    Node {
        predicate: WherePredicate,
        negated: bool,
    },
    Edge {
        predicate: WherePredicate,
        negated: bool,
    },
}

/// Fields a predicate can reference.
pub trait FieldSource {
    fn source_name(&self) -> &str;
    fn property_field(&self, name: &str) -> Option<&PropertyField>;
    fn relationship_field(&self, name: &str) -> Option<&RelationshipField>;
}

impl FieldSource for NodeType {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn property_field(&self, name: &str) -> Option<&PropertyField> {
        self.property(name)
    }

    fn relationship_field(&self, name: &str) -> Option<&RelationshipField> {
        self.relationship(name)
    }
}

impl FieldSource for RelationshipProperties {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn property_field(&self, name: &str) -> Option<&PropertyField> {
        self.property(name)
    }

    fn relationship_field(&self, _name: &str) -> Option<&RelationshipField> {
        None
    }
}

/// Parse a `where` object for `source`.
pub fn parse_where(
    schema: &GraphSchema,
    source: &dyn FieldSource,
    value: &Value,
) -> Result<WherePredicate, TranslationError> {
    let map = expect_object(value, || format!("where argument for {}", source.source_name()))?;
    let mut parts = Vec::with_capacity(map.len());
    for (key, value) in map {
        parts.push(parse_entry(schema, source, key, value)?);
    }
    Ok(collapse(parts))
}

/// Parse an optional `where` argument, treating `null` as absent.
pub fn parse_optional_where(
    schema: &GraphSchema,
    source: &dyn FieldSource,
    value: Option<&Value>,
) -> Result<Option<WherePredicate>, TranslationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_where(schema, source, value).map(Some),
    }
}

fn collapse(mut parts: Vec<WherePredicate>) -> WherePredicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        WherePredicate::And(parts)
    }
}

fn parse_entry(
    schema: &GraphSchema,
    source: &dyn FieldSource,
    key: &str,
    value: &Value,
) -> Result<WherePredicate, TranslationError> {
    if key == "AND" || key == "OR" {
        let items = value.as_array().ok_or_else(|| {
            TranslationError::schema(format!("`{}` in where for {} expects a list", key, source.source_name()))
        })?;
        let nested = items
            .iter()
            .map(|item| parse_where(schema, source, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(if key == "AND" {
            WherePredicate::And(nested)
        } else {
            WherePredicate::Or(nested)
        });
    }

    if let Some(property) = source.property_field(key) {
        return property_predicate(property, Operator::Equals, value);
    }
    if let Some(relationship) = source.relationship_field(key) {
        return relationship_predicate(schema, relationship, Quantifier::Some, value);
    }
    for (suffix, operator) in PROPERTY_SUFFIXES {
        if let Some(property) = key.strip_suffix(suffix).and_then(|base| source.property_field(base)) {
            return property_predicate(property, *operator, value);
        }
    }
    for (suffix, quantifier) in RELATIONSHIP_SUFFIXES {
        if let Some(relationship) = key
            .strip_suffix(suffix)
            .and_then(|base| source.relationship_field(base))
        {
            return relationship_predicate(schema, relationship, *quantifier, value);
        }
    }

    Err(TranslationError::schema(format!(
        "Unknown where field `{}` on {}",
        key,
        source.source_name()
    )))
}

fn property_predicate(
    property: &PropertyField,
    operator: Operator,
    value: &Value,
) -> Result<WherePredicate, TranslationError> {
    let shape_ok = match operator {
        Operator::In | Operator::NotIn => value.is_array(),
        Operator::Equals | Operator::NotEquals => true,
        Operator::Includes | Operator::NotIncludes => property.array && !value.is_null(),
        Operator::Contains
        | Operator::NotContains
        | Operator::StartsWith
        | Operator::NotStartsWith
        | Operator::EndsWith
        | Operator::NotEndsWith
        | Operator::Matches => value.is_string(),
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            !value.is_null() && !value.is_array() && !value.is_object()
        }
    };
    if !shape_ok || value.is_object() {
        return Err(TranslationError::schema(format!(
            "Invalid value {} for {:?} on field {}",
            value, operator, property.name
        )));
    }
    Ok(WherePredicate::Property {
        field: property.name.clone(),
        operator,
        value: value.clone(),
    })
}

fn relationship_predicate(
    schema: &GraphSchema,
    relationship: &RelationshipField,
    quantifier: Quantifier,
    value: &Value,
) -> Result<WherePredicate, TranslationError> {
    let targets = schema.targets_of(relationship)?;

    if value.is_null() {
        // `rel: null` means no related node, `rel_NOT: null` means at least one
        let quantifier = match quantifier {
            Quantifier::Some => Quantifier::None,
            Quantifier::None => Quantifier::Some,
            other => {
                return Err(TranslationError::schema(format!(
                    "{:?} filter on {} requires an object",
                    other, relationship.name
                )))
            }
        };
        let parts = targets
            .iter()
            .map(|target| WherePredicate::Relationship {
                field: relationship.name.clone(),
                target: target.name.clone(),
                quantifier,
                predicate: None,
            })
            .collect::<Vec<_>>();
        return Ok(if quantifier == Quantifier::None {
            collapse(parts)
        } else {
            WherePredicate::Or(parts)
        });
    }

    if !relationship.is_union() {
        let target = targets[0];
        let predicate = parse_where(schema, target, value)?;
        return Ok(WherePredicate::Relationship {
            field: relationship.name.clone(),
            target: target.name.clone(),
            quantifier,
            predicate: Some(Box::new(predicate)),
        });
    }

    // Union members are keyed by type name
    let map = expect_object(value, || format!("where for union field {}", relationship.name))?;
    let mut parts = Vec::with_capacity(map.len());
    for (member, member_where) in map {
        let target = targets
            .iter()
            .find(|t| &t.name == member)
            .ok_or_else(|| {
                TranslationError::schema(format!(
                    "{} is not a member of union field {}",
                    member, relationship.name
                ))
            })?;
        parts.push(WherePredicate::Relationship {
            field: relationship.name.clone(),
            target: target.name.clone(),
            quantifier,
            predicate: Some(Box::new(parse_where(schema, *target, member_where)?)),
        });
    }
    Ok(collapse(parts))
}

/// Parse a connection `where` (`node`, `node_NOT`, `edge`, `edge_NOT`, `AND`, `OR`).
pub fn parse_connection_where(
    schema: &GraphSchema,
    node: &NodeType,
    edge: Option<&RelationshipProperties>,
    value: &Value,
) -> Result<ConnectionPredicate, TranslationError> {
    let map = expect_object(value, || format!("connection where for {}", node.name))?;
    let mut parts = Vec::with_capacity(map.len());
    for (key, value) in map {
        let part = match key.as_str() {
            "AND" | "OR" => {
                let items = value.as_array().ok_or_else(|| {
                    TranslationError::schema(format!("`{}` in connection where expects a list", key))
                })?;
                let nested = items
                    .iter()
                    .map(|item| parse_connection_where(schema, node, edge, item))
                    .collect::<Result<Vec<_>, _>>()?;
                if key == "AND" {
                    ConnectionPredicate::And(nested)
                } else {
                    ConnectionPredicate::Or(nested)
                }
            }
            "node" | "node_NOT" => ConnectionPredicate::Node {
                predicate: parse_where(schema, node, value)?,
                negated: key == "node_NOT",
            },
            "edge" | "edge_NOT" => {
                let edge = edge.ok_or_else(|| {
                    TranslationError::schema(format!(
                        "Relationship to {} has no edge properties to filter on",
                        node.name
                    ))
                })?;
                ConnectionPredicate::Edge {
                    predicate: parse_where(schema, edge, value)?,
                    negated: key == "edge_NOT",
                }
            }
            other => {
                return Err(TranslationError::schema(format!(
                    "Unknown connection where field `{}`",
                    other
                )))
            }
        };
        parts.push(part);
    }
    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        ConnectionPredicate::And(parts)
    })
}

pub(crate) fn expect_object<'a>(
    value: &'a Value,
    context: impl FnOnce() -> String,
) -> Result<&'a Map<String, Value>, TranslationError> {
    value
        .as_object()
        .ok_or_else(|| TranslationError::schema(format!("Expected an object for {}", context())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::testing::test_schema;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("title", Operator::Equals; "equality")]
    #[test_case("title_NOT", Operator::NotEquals; "not equals")]
    #[test_case("title_CONTAINS", Operator::Contains; "contains")]
    #[test_case("title_NOT_STARTS_WITH", Operator::NotStartsWith; "not starts with")]
    #[test_case("title_ENDS_WITH", Operator::EndsWith; "ends with")]
    #[test_case("title_MATCHES", Operator::Matches; "matches")]
    fn test_string_operators(key: &str, expected: Operator) {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        let predicate = parse_where(&schema, movie, &json!({ key: "The" })).unwrap();
        assert_eq!(
            predicate,
            WherePredicate::Property {
                field: "title".to_string(),
                operator: expected,
                value: json!("The"),
            }
        );
    }

    #[test_case("released_LT", Operator::Lt; "lt")]
    #[test_case("released_LTE", Operator::Lte; "lte")]
    #[test_case("released_GT", Operator::Gt; "gt")]
    #[test_case("released_GTE", Operator::Gte; "gte")]
    fn test_numeric_operators(key: &str, expected: Operator) {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        match parse_where(&schema, movie, &json!({ key: 1999 })).unwrap() {
            WherePredicate::Property { operator, .. } => assert_eq!(operator, expected),
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_list_operators_need_lists() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        assert!(parse_where(&schema, movie, &json!({"released_IN": [1999, 2003]})).is_ok());
        assert!(parse_where(&schema, movie, &json!({"released_IN": 1999})).is_err());
        assert!(parse_where(&schema, movie, &json!({"tags_INCLUDES": "action"})).is_ok());
        assert!(parse_where(&schema, movie, &json!({"title_INCLUDES": "x"})).is_err());
    }

    #[test]
    fn test_underscored_property_names() {
        let schema = test_schema();
        let post = schema.node("Post").unwrap();
        match parse_where(&schema, post, &json!({"post_id_IN": ["a"]})).unwrap() {
            WherePredicate::Property { field, operator, .. } => {
                assert_eq!(field, "post_id");
                assert_eq!(operator, Operator::In);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_logical_groups_and_relationships() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        let predicate = parse_where(
            &schema,
            movie,
            &json!({
                "OR": [{"title": "A"}, {"title": "B"}],
                "actors_NONE": {"name": "Keanu"}
            }),
        )
        .unwrap();
        match predicate {
            WherePredicate::And(parts) => {
                assert!(matches!(&parts[0], WherePredicate::Or(items) if items.len() == 2));
                assert!(matches!(
                    &parts[1],
                    WherePredicate::Relationship { quantifier: Quantifier::None, target, .. } if target == "Actor"
                ));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_relationship_existence() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        assert_eq!(
            parse_where(&schema, movie, &json!({"director": null})).unwrap(),
            WherePredicate::Relationship {
                field: "director".to_string(),
                target: "Person".to_string(),
                quantifier: Quantifier::None,
                predicate: None,
            }
        );
        assert!(matches!(
            parse_where(&schema, movie, &json!({"director_NOT": null})).unwrap(),
            WherePredicate::Or(_)
        ));
    }

    #[test]
    fn test_union_where_keyed_by_member() {
        let schema = test_schema();
        let actor = schema.node("Actor").unwrap();
        assert!(parse_where(&schema, actor, &json!({"search_SOME": {"Movie": {"title": "A"}}})).is_ok());
        assert!(parse_where(&schema, actor, &json!({"search": {"Person": {"name": "A"}}})).is_err());
    }

    #[test]
    fn test_unknown_field_is_schema_mismatch() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        let err = parse_where(&schema, movie, &json!({"nope_IN": [1]})).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_MISMATCH");
    }

    #[test]
    fn test_connection_where() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        let actor = schema.node("Actor").unwrap();
        let field = movie.relationship("actors").unwrap();
        let edge = schema.relationship_properties(field).unwrap();
        let predicate = parse_connection_where(
            &schema,
            actor,
            edge,
            &json!({"node": {"name": "Keanu"}, "edge_NOT": {"role": "Neo"}}),
        )
        .unwrap();
        match predicate {
            ConnectionPredicate::And(parts) => {
                assert!(matches!(parts[0], ConnectionPredicate::Node { negated: false, .. }));
                assert!(matches!(parts[1], ConnectionPredicate::Edge { negated: true, .. }));
            }
            other => panic!("unexpected predicate {:?}", other),
        }
        assert!(parse_connection_where(&schema, actor, None, &json!({"edge": {"role": "x"}})).is_err());
    }
}
