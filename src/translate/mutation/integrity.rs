//! Required-relationship checks.
//!
//! A create that cannot possibly satisfy a required singular relationship is
//! rejected before a statement is built. Everything else is checked inside
//! the statement, after the writes, so a violation rolls the transaction back.

use super::super::Context;
use crate::auth::{codes, validate_call};
use crate::errors::TranslationError;
use crate::graph_catalog::NodeType;
use crate::selection::NodeInput;

/// Fail when `input` neither creates nor connects a required relationship.
pub fn check_create_input(node: &NodeType, input: &NodeInput) -> Result<(), TranslationError> {
    match node.required_relationships().find(|r| !input.attaches(&r.name)) {
        Some(missing) => {
            log::debug!("Create of {} is missing required {}", node.name, missing.name);
            Err(TranslationError::required(&node.name, &missing.name))
        }
        None => Ok(()),
    }
}

/// Message carried by the validation for `node.field`.
pub fn required_message(node: &NodeType, field: &str) -> String {
    format!("{}{}.{} required", codes::RELATIONSHIP_REQUIRED, node.name, field)
}

impl<'a> Context<'a> {
    /// One `apoc.util.validate` body per required singular relationship of
    /// `node`, asserting exactly one edge from the node bound to `variable`.
    pub fn required_relationship_checks(
        &self,
        node: &NodeType,
        variable: &str,
    ) -> Result<Vec<String>, TranslationError> {
        let mut checks = Vec::new();
        for relationship in node.required_relationships() {
            let targets = self.schema.targets_of(relationship)?;
            let labels = match targets.as_slice() {
                [single] => single.label_string(),
                _ => String::new(),
            };
            let predicate = format!(
                "size([({}){}({}) | 1]) = 1",
                variable,
                relationship.pattern(None),
                labels
            );
            checks.push(validate_call(&predicate, &required_message(node, &relationship.name)));
        }
        Ok(checks)
    }
}
