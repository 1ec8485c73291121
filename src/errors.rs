use thiserror::Error;

use crate::auth::codes;
use crate::cypher::AssemblyError;
use crate::execution::ExecutionError;
use crate::graph_catalog::GraphSchemaError;

/// Every failure a translation or execution can surface to the caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranslationError {
    /// Requested type, field or argument shape is unknown to the registry
    #[error("{0}")]
    SchemaMismatch(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{type_name}.{field} required")]
    RequiredRelationship { type_name: String, field: String },

    #[error("Internal error while assembling statement: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("{0}")]
    Execution(String),
}

impl TranslationError {
    pub fn schema(message: impl Into<String>) -> Self {
        TranslationError::SchemaMismatch(message.into())
    }

    pub fn forbidden() -> Self {
        TranslationError::Forbidden("Forbidden".to_string())
    }

    pub fn unauthenticated() -> Self {
        TranslationError::Authentication("Unauthenticated".to_string())
    }

    pub fn required(type_name: &str, field: &str) -> Self {
        TranslationError::RequiredRelationship {
            type_name: type_name.to_string(),
            field: field.to_string(),
        }
    }

    /// Stable machine-readable code for response error items.
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            TranslationError::Authentication(_) => "UNAUTHENTICATED",
            TranslationError::Forbidden(_) => "FORBIDDEN",
            TranslationError::RequiredRelationship { .. } => "RELATIONSHIP_REQUIRED",
            TranslationError::Assembly(_) => "ASSEMBLY_ERROR",
            TranslationError::Execution(_) => "EXECUTION_ERROR",
        }
    }
}

impl From<GraphSchemaError> for TranslationError {
    fn from(error: GraphSchemaError) -> Self {
        TranslationError::SchemaMismatch(error.to_string())
    }
}

impl From<ExecutionError> for TranslationError {
    /// Recover compiler-raised failures from the engine message; the codes
    /// are embedded by the validation calls the compiler emits.
    fn from(error: ExecutionError) -> Self {
        let message = error.message();
        if let Some(rest) = after_code(message, codes::RELATIONSHIP_REQUIRED) {
            let target = rest.split(" required").next().unwrap_or(rest).trim();
            if let Some((type_name, field)) = target.split_once('.') {
                return TranslationError::required(type_name, field);
            }
        }
        if after_code(message, codes::FORBIDDEN).is_some() {
            return TranslationError::forbidden();
        }
        if after_code(message, codes::UNAUTHENTICATED).is_some() {
            return TranslationError::unauthenticated();
        }
        TranslationError::Execution(message.to_string())
    }
}

fn after_code<'a>(message: &'a str, code: &str) -> Option<&'a str> {
    message.find(code).map(|at| &message[at + code.len()..])
}
