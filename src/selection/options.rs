//! `options` (sort, limit, offset) and connection `sort` arguments.

use serde_json::Value;
use std::fmt;

use super::where_parser::{expect_object, FieldSource};
use crate::errors::TranslationError;
use crate::graph_catalog::{NodeType, RelationshipProperties};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    /// Keys in priority order
    pub sort: Vec<SortField>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListOptions {
    pub fn is_empty(&self) -> bool {
        self.sort.is_empty() && self.limit.is_none() && self.offset.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortTarget {
    Node,
    Edge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSort {
    pub target: SortTarget,
    pub sort: SortField,
}

/// Parse `options` for a list of `node`, applying the type's query limits.
pub fn parse_options(node: &NodeType, value: Option<&Value>) -> Result<ListOptions, TranslationError> {
    let mut options = ListOptions::default();
    if let Some(value) = value.filter(|v| !v.is_null()) {
        let map = expect_object(value, || format!("options for {}", node.name))?;
        for (key, value) in map {
            match key.as_str() {
                "limit" => options.limit = non_negative(value, "limit")?,
                "offset" => options.offset = non_negative(value, "offset")?,
                "sort" => options.sort = parse_sort(node, value)?,
                other => {
                    return Err(TranslationError::schema(format!(
                        "Unknown option `{}` for {}",
                        other, node.name
                    )))
                }
            }
        }
    }
    if let Some(limits) = &node.limits {
        options.limit = limits.apply(options.limit);
    }
    Ok(options)
}

/// `[{title: ASC}, {released: DESC}]`; several keys in one object keep
/// their written order.
pub fn parse_sort(source: &dyn FieldSource, value: &Value) -> Result<Vec<SortField>, TranslationError> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        Value::Null => Vec::new(),
        other => {
            return Err(TranslationError::schema(format!(
                "Expected a list of sort objects, found {}",
                other
            )))
        }
    };

    let mut sort = Vec::new();
    for entry in entries {
        let map = expect_object(entry, || format!("sort for {}", source.source_name()))?;
        for (field, direction) in map {
            if source.property_field(field).is_none() {
                return Err(TranslationError::schema(format!(
                    "Cannot sort {} by unknown field `{}`",
                    source.source_name(),
                    field
                )));
            }
            sort.push(SortField {
                field: field.clone(),
                direction: parse_direction(direction)?,
            });
        }
    }
    Ok(sort)
}

/// `[{node: {name: ASC}}, {edge: {screenTime: DESC}}]`
pub fn parse_connection_sort(
    node: &NodeType,
    edge: Option<&RelationshipProperties>,
    value: &Value,
) -> Result<Vec<ConnectionSort>, TranslationError> {
    let entries = match value {
        Value::Array(items) => items.as_slice(),
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(TranslationError::schema(format!(
                "Expected a list of connection sort objects, found {}",
                other
            )))
        }
    };

    let mut sort = Vec::new();
    for entry in entries {
        let map = expect_object(entry, || "connection sort".to_string())?;
        for (key, value) in map {
            let (target, fields) = match key.as_str() {
                "node" => (SortTarget::Node, parse_sort(node, value)?),
                "edge" => {
                    let edge = edge.ok_or_else(|| {
                        TranslationError::schema(format!(
                            "Relationship to {} has no edge properties to sort on",
                            node.name
                        ))
                    })?;
                    (SortTarget::Edge, parse_sort(edge, value)?)
                }
                other => {
                    return Err(TranslationError::schema(format!(
                        "Unknown connection sort key `{}`",
                        other
                    )))
                }
            };
            sort.extend(fields.into_iter().map(|sort| ConnectionSort { target, sort }));
        }
    }
    Ok(sort)
}

fn parse_direction(value: &Value) -> Result<SortDirection, TranslationError> {
    match value.as_str() {
        Some("ASC") => Ok(SortDirection::Asc),
        Some("DESC") => Ok(SortDirection::Desc),
        _ => Err(TranslationError::schema(format!(
            "Sort direction must be ASC or DESC, found {}",
            value
        ))),
    }
}

/// Non-negative integer argument; `null` reads as absent.
pub fn non_negative(value: &Value, name: &str) -> Result<Option<u64>, TranslationError> {
    match value {
        Value::Null => Ok(None),
        other => other.as_u64().map(Some).ok_or_else(|| {
            TranslationError::schema(format!("`{}` must be a non-negative integer, found {}", name, other))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::testing::test_schema;
    use serde_json::json;

    #[test]
    fn test_parse_options() {
        let schema = test_schema();
        let actor = schema.node("Actor").unwrap();
        let options = parse_options(
            actor,
            Some(&json!({"limit": 2, "offset": 3, "sort": [{"name": "ASC"}, {"born": "DESC"}]})),
        )
        .unwrap();
        assert_eq!(options.limit, Some(2));
        assert_eq!(options.offset, Some(3));
        assert_eq!(
            options.sort,
            vec![
                SortField {
                    field: "name".to_string(),
                    direction: SortDirection::Asc
                },
                SortField {
                    field: "born".to_string(),
                    direction: SortDirection::Desc
                },
            ]
        );
    }

    #[test]
    fn test_limits_are_capped() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        assert_eq!(parse_options(movie, None).unwrap().limit, Some(100));
        assert_eq!(
            parse_options(movie, Some(&json!({"limit": 500}))).unwrap().limit,
            Some(100)
        );
        assert_eq!(
            parse_options(movie, Some(&json!({"limit": 5}))).unwrap().limit,
            Some(5)
        );
    }

    #[test]
    fn test_invalid_options() {
        let schema = test_schema();
        let actor = schema.node("Actor").unwrap();
        assert!(parse_options(actor, Some(&json!({"limit": -1}))).is_err());
        assert!(parse_options(actor, Some(&json!({"sort": [{"name": "UP"}]}))).is_err());
        assert!(parse_options(actor, Some(&json!({"sort": [{"movies": "ASC"}]}))).is_err());
        assert!(parse_options(actor, Some(&json!({"page": 1}))).is_err());
    }

    #[test]
    fn test_connection_sort() {
        let schema = test_schema();
        let movie = schema.node("Movie").unwrap();
        let actor = schema.node("Actor").unwrap();
        let edge = schema
            .relationship_properties(movie.relationship("actors").unwrap())
            .unwrap();
        let sort = parse_connection_sort(
            actor,
            edge,
            &json!([{"edge": {"screenTime": "DESC"}}, {"node": {"name": "ASC"}}]),
        )
        .unwrap();
        assert_eq!(sort[0].target, SortTarget::Edge);
        assert_eq!(sort[1].target, SortTarget::Node);
        assert_eq!(sort[1].sort.field, "name");
    }
}
