//! Selection Tree Walker
//!
//! Turns the caller's raw nested selection (field names, aliases, argument
//! bags, inline-fragment type conditions) into the typed intermediate form
//! the compilers consume. Every field and argument is resolved against the
//! registry here, so the compilers never see an unknown name.

pub mod cursor;
pub mod input;
pub mod options;
pub mod walker;
pub mod where_parser;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use input::{
    MutationBlock, NestedConnect, NestedCreate, NestedDelete, NestedDisconnect, NestedUpdate,
    NodeInput, PropertyWrite, RelationshipInput, WriteOperation,
};
pub use options::{ConnectionSort, ListOptions, SortDirection, SortField, SortTarget};
pub use walker::{
    ConnectionField, ConnectionSelection, DeleteRequest, EdgeField, FieldKind, InfoField,
    MutationRequest, NodeSelection, PageInfoField, PayloadField, ReadRequest,
    RelationshipSelection, SelectedField, SelectionWalker, TargetBranch, UpdateRequest,
};
pub use where_parser::{ConnectionPredicate, Operator, Quantifier, WherePredicate};

/// One field of the raw selection as decoded by the request layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub selections: Vec<FieldSelection>,
    /// Type condition of the inline fragment this field was selected in
    #[serde(default)]
    pub on: Option<String>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        FieldSelection {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Key the field's value is returned under
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn select(mut self, fields: Vec<FieldSelection>) -> Self {
        self.selections.extend(fields);
        self
    }

    pub fn on(mut self, type_name: impl Into<String>) -> Self {
        self.on = Some(type_name.into());
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name).filter(|v| !v.is_null())
    }
}

/// Shorthand for a list of leaf fields.
pub fn leaves(names: &[&str]) -> Vec<FieldSelection> {
    names.iter().map(|n| FieldSelection::new(*n)).collect()
}
