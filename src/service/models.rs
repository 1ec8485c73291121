use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::TranslationError;
use crate::execution::AccessMode;
use crate::selection::FieldSelection;
use crate::translate::{CompiledStatement, OperationKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Query,
    Mutation,
}

/// One root field resolved by the request layer to its operation and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootField {
    pub operation: OperationKind,
    pub node_type: String,
    pub selection: FieldSelection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRequest {
    #[serde(default)]
    pub kind: RequestKind,
    pub fields: Vec<RootField>,
    /// Raw bearer token, if the caller sent one
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorItem {
    pub message: String,
    pub code: String,
    /// Response keys leading to the failed field
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl ErrorItem {
    pub fn new(error: &TranslationError, path: Vec<String>) -> Self {
        ErrorItem {
            message: error.to_string(),
            code: error.code().to_string(),
            path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphResponse {
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorItem>,
}

impl GraphResponse {
    /// Response with no data and a single error
    pub fn failed(error: &TranslationError) -> Self {
        GraphResponse {
            data: None,
            errors: vec![ErrorItem::new(error, Vec::new())],
        }
    }
}

/// Statement view printed by the developer binary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementOutput {
    pub statement: String,
    pub parameters: Map<String, Value>,
    pub access_mode: AccessMode,
}

impl From<&CompiledStatement> for StatementOutput {
    fn from(compiled: &CompiledStatement) -> Self {
        StatementOutput {
            statement: compiled.statement.clone(),
            parameters: compiled.parameters.clone(),
            access_mode: compiled.access_mode,
        }
    }
}
