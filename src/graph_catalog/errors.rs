//! # Graph Schema Error Types
//!
//! Errors raised while building the metadata registry from a schema
//! definition, and while looking up node kinds during translation.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: Missing node kinds or relationship-properties types
//! - **Definition Errors**: Duplicate names, invalid identifiers, malformed auth rules
//! - **Configuration Errors**: File I/O and parsing issues during schema loading
//!
//! ## Usage Patterns
//!
//! Lookup failures carry the referencing location so the message is
//! actionable without a stack trace:
//!
//! ```ignore
//! GraphSchemaError::node_error_with_context(
//!     "Post",
//!     "Target of relationship field Comment.post"
//! )
//! ```

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphSchemaError {
    #[error("No node type found for `{node_label}`")]
    Node { node_label: String },
    #[error("No relationship properties type found for `{name}`")]
    RelationshipProperties { name: String },
    #[error("Type `{name}` is declared more than once")]
    DuplicateType { name: String },
    #[error("Field `{field}` is declared more than once on `{type_name}`")]
    DuplicateField { type_name: String, field: String },
    #[error("`{identifier}` is not a valid identifier (used in {context})")]
    InvalidIdentifier { identifier: String, context: String },
    #[error("Invalid auth rule on `{type_name}`: {message}")]
    InvalidAuthRule { type_name: String, message: String },
    #[error("Failed to read configuration file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse configuration: {error}")]
    ConfigParseError { error: String },
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl GraphSchemaError {
    /// Create a Node error with context information
    ///
    /// # Example
    /// ```ignore
    /// GraphSchemaError::node_error_with_context(
    ///     "Post",
    ///     "Target of relationship field Comment.post"
    /// )
    /// ```
    pub fn node_error_with_context(
        node_label: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        let label = node_label.into();
        let ctx = context.into();
        GraphSchemaError::Node {
            node_label: format!("{}\n  Context: {}", label, ctx),
        }
    }

    pub fn invalid_identifier(identifier: impl Into<String>, context: impl Into<String>) -> Self {
        GraphSchemaError::InvalidIdentifier {
            identifier: identifier.into(),
            context: context.into(),
        }
    }

    pub fn invalid_auth_rule(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        GraphSchemaError::InvalidAuthRule {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}
