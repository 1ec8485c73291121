use serde_json::Value;

use super::cursor::offset_after;
use super::input::{BlockKind, InputParser, NodeInput, PropertyWrite, RelationshipInput};
use super::options::{non_negative, parse_connection_sort, parse_options, ConnectionSort, ListOptions};
use super::where_parser::{
    expect_object, parse_connection_where, parse_optional_where, parse_where, ConnectionPredicate,
    WherePredicate,
};
use super::FieldSelection;
use crate::errors::TranslationError;
use crate::graph_catalog::graph_schema::is_valid_identifier;
use crate::graph_catalog::{GraphSchema, NodeType, RelationshipField};

const CONNECTION_SUFFIX: &str = "Connection";
const TYPENAME: &str = "__typename";

/// Fields requested on one concrete node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSelection {
    pub type_name: String,
    pub fields: Vec<SelectedField>,
}

impl NodeSelection {
    /// Property fields in selection order
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::Property(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedField {
    pub response_key: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Typename,
    Property(String),
    Relationship(RelationshipSelection),
    Connection(ConnectionSelection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipSelection {
    pub field: String,
    /// List field (`[Actor]`) rather than singular
    pub list: bool,
    pub union: bool,
    /// One branch per queried target type
    pub branches: Vec<TargetBranch>,
    pub options: ListOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetBranch {
    pub filter: Option<WherePredicate>,
    pub selection: NodeSelection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSelection {
    pub field: String,
    pub target: String,
    pub filter: Option<ConnectionPredicate>,
    pub sort: Vec<ConnectionSort>,
    pub first: Option<u64>,
    /// Edges skipped before the page, decoded from `after`
    pub offset: u64,
    pub fields: Vec<ConnectionField>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionField {
    Typename { key: String },
    TotalCount { key: String },
    Edges { key: String, fields: Vec<EdgeField> },
    PageInfo { key: String, fields: Vec<(String, PageInfoField)> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeField {
    Typename { key: String },
    Cursor { key: String },
    Node { key: String, selection: NodeSelection },
    /// Relationship property
    Property { key: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInfoField {
    Typename,
    HasNextPage,
    HasPreviousPage,
    StartCursor,
    EndCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoField {
    Typename,
    NodesCreated,
    NodesDeleted,
    RelationshipsCreated,
    RelationshipsDeleted,
}

impl InfoField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            TYPENAME => Some(InfoField::Typename),
            "nodesCreated" => Some(InfoField::NodesCreated),
            "nodesDeleted" => Some(InfoField::NodesDeleted),
            "relationshipsCreated" => Some(InfoField::RelationshipsCreated),
            "relationshipsDeleted" => Some(InfoField::RelationshipsDeleted),
            _ => None,
        }
    }
}

/// One field of a mutation response.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadField {
    Typename { key: String },
    /// Read-back of the written nodes under the type's plural key
    Nodes { key: String, selection: NodeSelection },
    Info { key: String, fields: Vec<(String, InfoField)> },
    /// Counter selected directly on a delete response
    Counter { key: String, field: InfoField },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub node: String,
    pub filter: Option<WherePredicate>,
    pub options: ListOptions,
    pub selection: NodeSelection,
}

/// Create mutation: one input per node to create.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub node: String,
    pub inputs: Vec<NodeInput>,
    pub payload: Vec<PayloadField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub node: String,
    pub filter: Option<WherePredicate>,
    pub properties: Vec<PropertyWrite>,
    /// Relationship blocks in the order they appear in the arguments
    pub relationships: Vec<RelationshipInput>,
    pub payload: Vec<PayloadField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub node: String,
    pub filter: Option<WherePredicate>,
    pub cascade: Vec<RelationshipInput>,
    pub payload: Vec<PayloadField>,
}

pub struct SelectionWalker<'a> {
    schema: &'a GraphSchema,
    max_depth: u32,
}

impl<'a> SelectionWalker<'a> {
    pub fn new(schema: &'a GraphSchema, max_depth: u32) -> Self {
        SelectionWalker { schema, max_depth }
    }

    pub fn read(&self, node: &NodeType, field: &FieldSelection) -> Result<ReadRequest, TranslationError> {
        check_arguments(field, &["where", "options"])?;
        Ok(ReadRequest {
            node: node.name.clone(),
            filter: parse_optional_where(self.schema, node, field.argument("where"))?,
            options: parse_options(node, field.argument("options"))?,
            selection: self.node_selection(node, &field.selections, 1)?,
        })
    }

    pub fn create(&self, node: &NodeType, field: &FieldSelection) -> Result<MutationRequest, TranslationError> {
        check_arguments(field, &["input"])?;
        let parser = InputParser::new(self.schema);
        let inputs = match field.argument("input") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| parser.create_input(node, item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(item) => vec![parser.create_input(node, item)?],
            None => {
                return Err(TranslationError::schema(format!(
                    "Create mutation for {} requires `input`",
                    node.name
                )))
            }
        };
        Ok(MutationRequest {
            node: node.name.clone(),
            inputs,
            payload: self.payload(node, field, false)?,
        })
    }

    pub fn update(&self, node: &NodeType, field: &FieldSelection) -> Result<UpdateRequest, TranslationError> {
        check_arguments(field, &["where", "update", "connect", "disconnect", "create", "delete"])?;
        let parser = InputParser::new(self.schema);
        let mut request = UpdateRequest {
            node: node.name.clone(),
            filter: None,
            properties: Vec::new(),
            relationships: Vec::new(),
            payload: self.payload(node, field, false)?,
        };
        for (key, value) in &field.arguments {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "where" => request.filter = Some(parse_where(self.schema, node, value)?),
                "update" => {
                    let input = parser.update_input(node, value)?;
                    request.properties.extend(input.properties);
                    request.relationships.extend(input.relationships);
                }
                other => {
                    let kind = match other {
                        "connect" => BlockKind::Connect,
                        "disconnect" => BlockKind::Disconnect,
                        "create" => BlockKind::Create,
                        _ => BlockKind::Delete,
                    };
                    request
                        .relationships
                        .extend(parser.relationship_argument(node, kind, value)?);
                }
            }
        }
        Ok(request)
    }

    pub fn delete(&self, node: &NodeType, field: &FieldSelection) -> Result<DeleteRequest, TranslationError> {
        check_arguments(field, &["where", "delete"])?;
        let parser = InputParser::new(self.schema);
        Ok(DeleteRequest {
            node: node.name.clone(),
            filter: parse_optional_where(self.schema, node, field.argument("where"))?,
            cascade: match field.argument("delete") {
                Some(value) => parser.relationship_argument(node, BlockKind::Delete, value)?,
                None => Vec::new(),
            },
            payload: self.payload(node, field, true)?,
        })
    }

    fn payload(&self, node: &NodeType, field: &FieldSelection, delete: bool) -> Result<Vec<PayloadField>, TranslationError> {
        let mut payload = Vec::new();
        for selection in &field.selections {
            let key = response_key(selection)?;
            let item = if selection.name == TYPENAME {
                PayloadField::Typename { key }
            } else if !delete && selection.name == node.plural {
                PayloadField::Nodes {
                    key,
                    selection: self.node_selection(node, &selection.selections, 1)?,
                }
            } else if !delete && selection.name == "info" {
                let fields = selection
                    .selections
                    .iter()
                    .map(|s| {
                        let field = InfoField::from_name(&s.name).ok_or_else(|| unknown_field(&s.name, "info"))?;
                        Ok((response_key(s)?, field))
                    })
                    .collect::<Result<Vec<_>, TranslationError>>()?;
                PayloadField::Info { key, fields }
            } else if let (true, Some(counter)) = (delete, InfoField::from_name(&selection.name)) {
                PayloadField::Counter { key, field: counter }
            } else {
                return Err(unknown_field(&selection.name, "mutation response"));
            };
            payload.push(item);
        }
        Ok(payload)
    }

    pub fn node_selection(
        &self,
        node: &NodeType,
        selections: &[FieldSelection],
        depth: u32,
    ) -> Result<NodeSelection, TranslationError> {
        if depth > self.max_depth {
            return Err(TranslationError::schema(format!(
                "Selection exceeds the maximum depth of {}",
                self.max_depth
            )));
        }

        let mut fields: Vec<SelectedField> = Vec::with_capacity(selections.len());
        for selection in selections {
            if let Some(condition) = &selection.on {
                if condition != &node.name {
                    return Err(TranslationError::schema(format!(
                        "Fragment on {} cannot apply to {}",
                        condition, node.name
                    )));
                }
            }
            let key = response_key(selection)?;
            let kind = self.field_kind(node, selection, depth)?;
            match fields.iter().find(|f| f.response_key == key) {
                Some(existing) if existing.kind == kind => continue,
                Some(_) => {
                    return Err(TranslationError::schema(format!(
                        "Conflicting selections for `{}` on {}",
                        key, node.name
                    )))
                }
                None => fields.push(SelectedField { response_key: key, kind }),
            }
        }

        Ok(NodeSelection {
            type_name: node.name.clone(),
            fields,
        })
    }

    fn field_kind(&self, node: &NodeType, selection: &FieldSelection, depth: u32) -> Result<FieldKind, TranslationError> {
        if selection.name == TYPENAME {
            return Ok(FieldKind::Typename);
        }
        if let Some(property) = node.property(&selection.name) {
            if !selection.selections.is_empty() || !selection.arguments.is_empty() {
                return Err(TranslationError::schema(format!(
                    "Property {}.{} takes no arguments or sub-selections",
                    node.name, property.name
                )));
            }
            return Ok(FieldKind::Property(property.name.clone()));
        }
        if let Some(relationship) = node.relationship(&selection.name) {
            return self
                .relationship_selection(relationship, selection, depth + 1)
                .map(FieldKind::Relationship);
        }
        if let Some(relationship) = selection
            .name
            .strip_suffix(CONNECTION_SUFFIX)
            .and_then(|base| node.relationship(base))
        {
            return self
                .connection_selection(relationship, selection, depth + 1)
                .map(FieldKind::Connection);
        }
        Err(unknown_field(&selection.name, &node.name))
    }

    fn relationship_selection(
        &self,
        relationship: &RelationshipField,
        selection: &FieldSelection,
        depth: u32,
    ) -> Result<RelationshipSelection, TranslationError> {
        check_arguments(selection, &["where", "options"])?;
        let targets = self.schema.targets_of(relationship)?;

        if !relationship.is_union() {
            let target = targets[0];
            return Ok(RelationshipSelection {
                field: relationship.name.clone(),
                list: relationship.array,
                union: false,
                branches: vec![TargetBranch {
                    filter: parse_optional_where(self.schema, target, selection.argument("where"))?,
                    selection: self.node_selection(target, &selection.selections, depth)?,
                }],
                options: parse_options(target, selection.argument("options"))?,
            });
        }

        let member_filters = selection
            .argument("where")
            .map(|w| expect_object(w, || format!("where for union field {}", relationship.name)))
            .transpose()?;
        for selected in &selection.selections {
            let shared = selected.on.is_none() && selected.name == TYPENAME;
            let known_member = selected
                .on
                .as_ref()
                .map_or(false, |on| targets.iter().any(|t| &t.name == on));
            if !shared && !known_member {
                return Err(TranslationError::schema(format!(
                    "Union field {} only accepts inline fragments on its members",
                    relationship.name
                )));
            }
        }

        let mut branches = Vec::new();
        for target in &targets {
            let filter = match member_filters {
                Some(filters) => match filters.get(&target.name) {
                    Some(member_where) => Some(parse_where(self.schema, *target, member_where)?),
                    None => continue,
                },
                None => None,
            };
            let member_selections = selection
                .selections
                .iter()
                .filter(|s| s.on.as_deref().map_or(true, |on| on == target.name))
                .cloned()
                .collect::<Vec<_>>();
            branches.push(TargetBranch {
                filter,
                selection: self.node_selection(target, &member_selections, depth)?,
            });
        }
        if let Some(filters) = member_filters {
            if let Some(unknown) = filters.keys().find(|k| !targets.iter().any(|t| &t.name == *k)) {
                return Err(TranslationError::schema(format!(
                    "{} is not a member of union field {}",
                    unknown, relationship.name
                )));
            }
        }

        let mut options = ListOptions::default();
        if let Some(value) = selection.argument("options") {
            let map = expect_object(value, || format!("options for {}", relationship.name))?;
            for (key, value) in map {
                match key.as_str() {
                    "limit" => options.limit = non_negative(value, "limit")?,
                    "offset" => options.offset = non_negative(value, "offset")?,
                    other => {
                        return Err(TranslationError::schema(format!(
                            "Option `{}` is not supported on union field {}",
                            other, relationship.name
                        )))
                    }
                }
            }
        }

        Ok(RelationshipSelection {
            field: relationship.name.clone(),
            list: relationship.array,
            union: true,
            branches,
            options,
        })
    }

    fn connection_selection(
        &self,
        relationship: &RelationshipField,
        selection: &FieldSelection,
        depth: u32,
    ) -> Result<ConnectionSelection, TranslationError> {
        check_arguments(selection, &["where", "sort", "first", "after"])?;
        if relationship.is_union() {
            return Err(TranslationError::schema(format!(
                "Connections over union field {} are not supported",
                relationship.name
            )));
        }
        let target = self.schema.targets_of(relationship)?[0];
        let edge = self.schema.relationship_properties(relationship)?;

        let filter = selection
            .argument("where")
            .map(|w| parse_connection_where(self.schema, target, edge, w))
            .transpose()?;
        let sort = match selection.argument("sort") {
            Some(value) => parse_connection_sort(target, edge, value)?,
            None => Vec::new(),
        };
        let requested = match selection.argument("first") {
            Some(value) => non_negative(value, "first")?,
            None => None,
        };
        let first = match &target.limits {
            Some(limits) => limits.apply(requested),
            None => requested,
        };
        let offset = match selection.argument("after") {
            Some(Value::String(cursor)) => offset_after(cursor)?,
            Some(other) => {
                return Err(TranslationError::schema(format!("Invalid cursor {}", other)));
            }
            None => 0,
        };

        let mut fields = Vec::new();
        for child in &selection.selections {
            let key = response_key(child)?;
            let field = match child.name.as_str() {
                TYPENAME => ConnectionField::Typename { key },
                "totalCount" => ConnectionField::TotalCount { key },
                "pageInfo" => ConnectionField::PageInfo {
                    key,
                    fields: child
                        .selections
                        .iter()
                        .map(|s| Ok((response_key(s)?, page_info_field(&s.name)?)))
                        .collect::<Result<Vec<_>, TranslationError>>()?,
                },
                "edges" => {
                    let mut edge_fields = Vec::new();
                    for edge_child in &child.selections {
                        let key = response_key(edge_child)?;
                        edge_fields.push(match edge_child.name.as_str() {
                            TYPENAME => EdgeField::Typename { key },
                            "cursor" => EdgeField::Cursor { key },
                            "node" => EdgeField::Node {
                                key,
                                selection: self.node_selection(target, &edge_child.selections, depth)?,
                            },
                            name => match edge.and_then(|e| e.property(name)) {
                                Some(property) => EdgeField::Property {
                                    key,
                                    name: property.name.clone(),
                                },
                                None => return Err(unknown_field(name, "edge")),
                            },
                        });
                    }
                    ConnectionField::Edges {
                        key,
                        fields: edge_fields,
                    }
                }
                other => return Err(unknown_field(other, &selection.name)),
            };
            fields.push(field);
        }

        Ok(ConnectionSelection {
            field: relationship.name.clone(),
            target: target.name.clone(),
            filter,
            sort,
            first,
            offset,
            fields,
        })
    }
}

fn page_info_field(name: &str) -> Result<PageInfoField, TranslationError> {
    match name {
        TYPENAME => Ok(PageInfoField::Typename),
        "hasNextPage" => Ok(PageInfoField::HasNextPage),
        "hasPreviousPage" => Ok(PageInfoField::HasPreviousPage),
        "startCursor" => Ok(PageInfoField::StartCursor),
        "endCursor" => Ok(PageInfoField::EndCursor),
        other => Err(unknown_field(other, "pageInfo")),
    }
}

/// Response keys become map keys in statement text, so they must be plain
/// identifiers (`__typename` included).
fn response_key(selection: &FieldSelection) -> Result<String, TranslationError> {
    let key = selection.response_key();
    if is_valid_identifier(key) {
        Ok(key.to_string())
    } else {
        Err(TranslationError::schema(format!("Invalid response key `{}`", key)))
    }
}

fn check_arguments(selection: &FieldSelection, allowed: &[&str]) -> Result<(), TranslationError> {
    match selection.arguments.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(TranslationError::schema(format!(
            "Unknown argument `{}` on field {}",
            key, selection.name
        ))),
        None => Ok(()),
    }
}

fn unknown_field(name: &str, owner: &str) -> TranslationError {
    TranslationError::schema(format!("Unknown field `{}` on {}", name, owner))
}
