//! Map projections and the nested `CALL` subqueries that feed them.
//!
//! Nested fields never re-match their parent: each subquery imports the
//! parent variable with `WITH` and extends it with one relationship hop.

use serde_json::json;

use super::filter::{conjunction, property_expression};
use super::Context;
use crate::auth::{forbidden_check, RuleKind};
use crate::cypher::{quote, Statement, Subquery};
use crate::errors::TranslationError;
use crate::graph_catalog::{AuthOperation, NodeType, RelationshipField};
use crate::selection::cursor::MAX_OFFSET;
use crate::selection::{
    ConnectionField, ConnectionSelection, EdgeField, FieldKind, ListOptions, NodeSelection,
    RelationshipSelection, SortTarget,
};

/// Key the related node is projected under inside a connection edge map.
pub const EDGE_NODE_KEY: &str = "node";

#[derive(Debug, Default)]
pub struct Projection {
    /// Subqueries that must run before `expression` is evaluated
    pub subqueries: Vec<Subquery>,
    /// `var { ... }`, or `{}` when nothing is projected
    pub expression: String,
    /// Columns the subqueries add to scope
    pub columns: Vec<String>,
}

impl Projection {
    /// Push the subqueries onto `body`.
    pub fn emit(&mut self, body: &mut Statement) {
        for subquery in self.subqueries.drain(..) {
            body.call(subquery);
        }
    }

    /// `variable` followed by the subquery columns.
    pub fn scope<'s>(&'s self, variable: &'s str) -> Vec<&'s str> {
        let mut scope = vec![variable];
        scope.extend(self.columns.iter().map(String::as_str));
        scope
    }
}

impl<'a> Context<'a> {
    /// Project `selection` over `variable`. `leading` entries are placed
    /// first in the map.
    pub fn project(
        &mut self,
        node: &NodeType,
        selection: &NodeSelection,
        variable: &str,
        leading: Vec<String>,
    ) -> Result<Projection, TranslationError> {
        let mut projection = Projection::default();
        let mut entries = leading;

        for field in &selection.fields {
            let key = &field.response_key;
            match &field.kind {
                FieldKind::Typename => {}
                FieldKind::Property(name) => {
                    let property = node.property(name).ok_or_else(|| {
                        TranslationError::schema(format!("Unknown field `{}` on {}", name, node.name))
                    })?;
                    let plain = key == &property.name
                        && property.db_name() == property.name
                        && property.coalesce_value.is_none();
                    if plain {
                        entries.push(format!(".{}", property.name));
                    } else {
                        let value = property_expression(property, variable, &mut self.params);
                        entries.push(format!("{}: {}", key, value));
                    }
                }
                FieldKind::Relationship(related) => {
                    let column = self.reserve_variable(format!("{}_{}", variable, key));
                    let relationship = relationship_field(node, &related.field)?;
                    let subquery = if related.union {
                        self.union_subquery(relationship, related, variable, &column)?
                    } else {
                        self.relationship_subquery(relationship, related, variable, &column)?
                    };
                    projection.subqueries.push(subquery);
                    entries.push(format!("{}: {}", key, column));
                    projection.columns.push(column);
                }
                FieldKind::Connection(connection) => {
                    let column = self.reserve_variable(format!("{}_{}", variable, key));
                    let relationship = relationship_field(node, &connection.field)?;
                    projection
                        .subqueries
                        .push(self.connection_subquery(relationship, connection, variable, &column)?);
                    entries.push(format!("{}: {}", key, column));
                    projection.columns.push(column);
                }
            }
        }

        projection.expression = if entries.is_empty() {
            "{}".to_string()
        } else {
            format!("{} {{ {} }}", variable, entries.join(", "))
        };
        Ok(projection)
    }

    /// `WITH var ORDER BY … SKIP … LIMIT …` for list options.
    pub fn paginate(
        &mut self,
        body: &mut Statement,
        node: Option<&NodeType>,
        options: &ListOptions,
        variable: &str,
    ) -> Result<(), TranslationError> {
        if options.is_empty() {
            return Ok(());
        }
        body.with(&[variable]);
        if !options.sort.is_empty() {
            let node = node.ok_or_else(|| TranslationError::schema("Sorting requires a concrete node type"))?;
            let mut keys = Vec::with_capacity(options.sort.len());
            for sort in &options.sort {
                let property = node.property(&sort.field).ok_or_else(|| {
                    TranslationError::schema(format!("Cannot sort {} by unknown field `{}`", node.name, sort.field))
                })?;
                keys.push(format!(
                    "{} {}",
                    property_expression(property, variable, &mut self.params),
                    sort.direction
                ));
            }
            body.order_by(&keys, &[variable]);
        }
        if let Some(offset) = options.offset {
            let param = self.params.add_named(&format!("{}_offset", variable), json!(offset));
            body.skip(&param);
        }
        if let Some(limit) = options.limit {
            let param = self.params.add_named(&format!("{}_limit", variable), json!(limit));
            body.limit(&param);
        }
        Ok(())
    }

    fn relationship_subquery(
        &mut self,
        relationship: &RelationshipField,
        related: &RelationshipSelection,
        parent: &str,
        column: &str,
    ) -> Result<Subquery, TranslationError> {
        let branch = related.branches.first().ok_or_else(|| {
            TranslationError::schema(format!("Relationship {} has no target selection", related.field))
        })?;
        let target = self.schema.node(&branch.selection.type_name)?;
        let child = column;

        let mut body = Statement::new();
        body.match_pattern(
            &format!("({}){}({}{})", parent, relationship.pattern(None), child, target.label_string()),
            &[child],
            &[parent],
        );
        self.filter_matched(
            &mut body,
            target,
            branch.filter.as_ref(),
            Some(&branch.selection),
            &[],
            child,
            AuthOperation::Read,
        )?;
        self.paginate(&mut body, Some(target), &related.options, child)?;

        let mut projection = self.project(target, &branch.selection, child, Vec::new())?;
        projection.emit(&mut body);
        let aggregate = if related.list {
            format!("collect({})", projection.expression)
        } else {
            format!("head(collect({}))", projection.expression)
        };
        body.return_items(
            &format!("{} AS {}", aggregate, column),
            &[column],
            &projection.scope(child),
        );
        Ok(Subquery::new(&[parent], body))
    }

    fn union_subquery(
        &mut self,
        relationship: &RelationshipField,
        related: &RelationshipSelection,
        parent: &str,
        column: &str,
    ) -> Result<Subquery, TranslationError> {
        let mut body = Statement::new();
        if related.branches.is_empty() {
            let empty = if related.list { "[]" } else { "null" };
            body.return_items(&format!("{} AS {}", empty, column), &[column], &[]);
            return Ok(Subquery::new(&[parent], body));
        }

        let mut members = Vec::with_capacity(related.branches.len());
        for branch in &related.branches {
            let member = self.schema.node(&branch.selection.type_name)?;
            let member_var = format!("{}_{}", column, member.name);
            let mut member_body = Statement::new();
            member_body.match_pattern(
                &format!(
                    "({}){}({}{})",
                    parent,
                    relationship.pattern(None),
                    member_var,
                    member.label_string()
                ),
                &[member_var.as_str()],
                &[parent],
            );
            self.filter_matched(
                &mut member_body,
                member,
                branch.filter.as_ref(),
                Some(&branch.selection),
                &[],
                &member_var,
                AuthOperation::Read,
            )?;
            let resolve = format!("__resolveType: {}", quote(&member.name));
            let mut projection = self.project(member, &branch.selection, &member_var, vec![resolve])?;
            projection.emit(&mut member_body);
            member_body.return_items(
                &format!("{} AS {}", projection.expression, column),
                &[column],
                &projection.scope(&member_var),
            );
            members.push(member_body);
        }
        body.call(Subquery::union(&[parent], members));
        self.paginate(&mut body, None, &related.options, column)?;

        let aggregate = if related.list {
            format!("collect({})", column)
        } else {
            format!("head(collect({}))", column)
        };
        body.return_items(&format!("{} AS {}", aggregate, column), &[column], &[column]);
        Ok(Subquery::new(&[parent], body))
    }

    fn connection_subquery(
        &mut self,
        relationship: &RelationshipField,
        connection: &ConnectionSelection,
        parent: &str,
        column: &str,
    ) -> Result<Subquery, TranslationError> {
        let target = self.schema.node(&connection.target)?;
        let edge = self.schema.relationship_properties(relationship)?;
        let node_var = format!("{}_node", column);
        let edge_var = format!("{}_edge", column);
        let node_selection = edge_node_selection(connection, &target.name);

        let mut body = Statement::new();
        body.match_pattern(
            &format!(
                "({}){}({}{})",
                parent,
                relationship.pattern(Some(&edge_var)),
                node_var,
                target.label_string()
            ),
            &[node_var.as_str(), edge_var.as_str()],
            &[parent],
        );

        let auth_where = self.auth.node_predicate(
            target,
            AuthOperation::Read,
            RuleKind::Where,
            &node_var,
            &mut self.params,
        )?;
        let allow = self.allow_predicate(target, Some(&node_selection), &[], &node_var, AuthOperation::Read)?;
        let mut conditions = Vec::new();
        if let Some(filter) = &connection.filter {
            conditions.push(
                self.filters
                    .connection(target, edge, filter, &node_var, &edge_var, &mut self.params)?,
            );
        }
        conditions.extend(auth_where);
        if let Some(condition) = conjunction(conditions) {
            body.where_clause(&condition, &[node_var.as_str(), edge_var.as_str()]);
        }
        if let Some(allow) = allow {
            body.procedure(&forbidden_check(&allow), &[node_var.as_str()]);
        }

        let mut projection = self.project(target, &node_selection, &node_var, Vec::new())?;
        projection.emit(&mut body);
        let mut scope = projection.scope(&node_var);
        scope.push(&edge_var);

        if !connection.sort.is_empty() {
            let mut keys = Vec::with_capacity(connection.sort.len());
            for sort in &connection.sort {
                let (property, variable) = match sort.target {
                    SortTarget::Node => (target.property(&sort.sort.field), &node_var),
                    SortTarget::Edge => (edge.and_then(|e| e.property(&sort.sort.field)), &edge_var),
                };
                let property = property.ok_or_else(|| {
                    TranslationError::schema(format!("Cannot sort connection by unknown field `{}`", sort.sort.field))
                })?;
                keys.push(format!(
                    "{} {}",
                    property_expression(property, variable, &mut self.params),
                    sort.sort.direction
                ));
            }
            body.with(&scope);
            body.order_by(&keys, &scope);
        }

        let mut entries: Vec<String> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for field in connection_edge_fields(connection) {
            match field {
                EdgeField::Node { .. } if !seen.contains(&EDGE_NODE_KEY) => {
                    seen.push(EDGE_NODE_KEY);
                    entries.push(format!("{}: {}", EDGE_NODE_KEY, projection.expression));
                }
                EdgeField::Property { name, .. } if !seen.contains(&name.as_str()) => {
                    seen.push(name);
                    let property = edge.and_then(|e| e.property(name)).ok_or_else(|| {
                        TranslationError::schema(format!("Unknown edge property `{}`", name))
                    })?;
                    entries.push(format!(
                        "{}: {}",
                        name,
                        property_expression(property, &edge_var, &mut self.params)
                    ));
                }
                _ => {}
            }
        }
        let edge_map = format!("{{ {} }}", entries.join(", "));
        let edge_map = if entries.is_empty() { "{}".to_string() } else { edge_map };

        body.with_items(&format!("collect({}) AS edges", edge_map), &["edges"], &scope);
        body.with_items("edges, size(edges) AS totalCount", &["edges", "totalCount"], &["edges"]);
        let start = self.params.add(column, json!(connection.offset));
        let slice = match connection.first {
            Some(first) => {
                let end = connection.offset.saturating_add(first).min(MAX_OFFSET);
                let end = self.params.add(column, json!(end));
                format!("edges[{}..{}]", start, end)
            }
            None => format!("edges[{}..]", start),
        };
        body.return_items(
            &format!("{{ edges: {}, totalCount: totalCount }} AS {}", slice, column),
            &[column],
            &["edges", "totalCount"],
        );
        Ok(Subquery::new(&[parent], body))
    }
}

fn relationship_field<'n>(node: &'n NodeType, name: &str) -> Result<&'n RelationshipField, TranslationError> {
    node.relationship(name)
        .ok_or_else(|| TranslationError::schema(format!("Unknown field `{}` on {}", name, node.name)))
}

fn connection_edge_fields(connection: &ConnectionSelection) -> impl Iterator<Item = &EdgeField> {
    connection.fields.iter().flat_map(|field| match field {
        ConnectionField::Edges { fields, .. } => fields.as_slice(),
        _ => &[],
    })
}

/// Every `node` selection under `edges`, merged by response key.
pub fn edge_node_selection(connection: &ConnectionSelection, type_name: &str) -> NodeSelection {
    let mut merged = NodeSelection {
        type_name: type_name.to_string(),
        fields: Vec::new(),
    };
    for field in connection_edge_fields(connection) {
        if let EdgeField::Node { selection, .. } = field {
            for selected in &selection.fields {
                if !merged.fields.iter().any(|f| f.response_key == selected.response_key) {
                    merged.fields.push(selected.clone());
                }
            }
        }
    }
    merged
}
