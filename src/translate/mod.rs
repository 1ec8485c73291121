//! Read compiler and mutation planner.
//!
//! A [`Translator`] walks one root field into the typed selection form,
//! compiles it into a fragment tree plus a [`ParameterTable`], and assembles
//! the final statement. Each call owns its own parameter table; the schema
//! is the only shared state.

pub mod filter;
pub mod mutation;
pub mod projection;
pub mod read;
pub mod result_shape;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::auth::{forbidden_check, AuthCompiler, Claims, RuleKind, GLOBAL_AUTH_MESSAGE};
use crate::config::CompilerConfig;
use crate::cypher::{assemble, ParameterTable, Statement};
use crate::errors::TranslationError;
use crate::execution::AccessMode;
use crate::graph_catalog::{AuthOperation, GraphSchema, NodeType};
use crate::selection::{FieldSelection, NodeSelection, SelectionWalker, WherePredicate};

use filter::{conjunction, FilterCompiler};
pub use result_shape::ResultShape;

/// Variable bound to the root node of every statement.
pub const ROOT_VARIABLE: &str = "this";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn access_mode(&self) -> AccessMode {
        match self {
            OperationKind::Read => AccessMode::Read,
            _ => AccessMode::Write,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A finished statement ready for the execution boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub statement: String,
    pub parameters: Map<String, Value>,
    pub access_mode: AccessMode,
    /// How to fold the returned rows into the requested shape
    pub shape: ResultShape,
}

/// Per-compilation state threaded through the read and write compilers.
pub(crate) struct Context<'a> {
    pub schema: &'a GraphSchema,
    pub auth: AuthCompiler<'a>,
    pub filters: FilterCompiler<'a>,
    pub params: ParameterTable,
    /// Subquery columns handed out so far; they share the outer scope
    variables: HashSet<String>,
}

impl<'a> Context<'a> {
    pub fn new(schema: &'a GraphSchema, claims: Option<&'a Claims>) -> Self {
        Context {
            schema,
            auth: AuthCompiler::new(schema, claims),
            filters: FilterCompiler::new(schema),
            params: ParameterTable::new(),
            variables: HashSet::new(),
        }
    }

    /// Claim `base` as a variable name, or `base_<n>` when a response alias
    /// or an earlier block already produced it.
    pub fn reserve_variable(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut suffix = 1;
        while !self.variables.insert(candidate.clone()) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    /// `WHERE` for a freshly matched `variable` (request filter AND the
    /// `where` auth rule) followed by the `allow` validation for the
    /// operation. Auth is compiled first so a rejected caller fails before
    /// any of the filter is built.
    pub fn filter_matched(
        &mut self,
        body: &mut Statement,
        node: &NodeType,
        filter: Option<&WherePredicate>,
        selection: Option<&NodeSelection>,
        written: &[&str],
        variable: &str,
        operation: AuthOperation,
    ) -> Result<(), TranslationError> {
        let auth_where = self
            .auth
            .node_predicate(node, operation, RuleKind::Where, variable, &mut self.params)?;
        let allow = self.allow_predicate(node, selection, written, variable, operation)?;

        let mut conditions = Vec::new();
        if let Some(filter) = filter {
            conditions.push(self.filters.compile(node, filter, variable, &mut self.params)?);
        }
        conditions.extend(auth_where);
        if let Some(condition) = conjunction(conditions) {
            body.where_clause(&condition, &[variable]);
        }
        if let Some(allow) = allow {
            body.procedure(&forbidden_check(&allow), &[variable]);
        }
        Ok(())
    }

    /// Node-level `allow` for `operation` AND the field-level `allow` of
    /// every selected (read) or written property.
    pub fn allow_predicate(
        &mut self,
        node: &NodeType,
        selection: Option<&NodeSelection>,
        written: &[&str],
        variable: &str,
        operation: AuthOperation,
    ) -> Result<Option<String>, TranslationError> {
        self.rule_predicate(node, selection, written, variable, operation, RuleKind::Allow)
    }

    pub fn bind_predicate(
        &mut self,
        node: &NodeType,
        written: &[&str],
        variable: &str,
        operation: AuthOperation,
    ) -> Result<Option<String>, TranslationError> {
        self.rule_predicate(node, None, written, variable, operation, RuleKind::Bind)
    }

    fn rule_predicate(
        &mut self,
        node: &NodeType,
        selection: Option<&NodeSelection>,
        written: &[&str],
        variable: &str,
        operation: AuthOperation,
        kind: RuleKind,
    ) -> Result<Option<String>, TranslationError> {
        let mut parts = Vec::new();
        parts.extend(self.auth.node_predicate(node, operation, kind, variable, &mut self.params)?);

        let mut fields: Vec<&str> = Vec::new();
        let selected = selection.into_iter().flat_map(|s| s.properties());
        for field in selected.chain(written.iter().copied()) {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        for field in fields {
            parts.extend(
                self.auth
                    .field_predicate(node, field, operation, kind, variable, &mut self.params)?,
            );
        }
        Ok(conjunction(parts))
    }

    pub fn finish(
        self,
        statement: &Statement,
        access_mode: AccessMode,
        shape: ResultShape,
    ) -> Result<CompiledStatement, TranslationError> {
        let text = assemble(statement, &self.params)?;
        log::debug!("Compiled {} statement:\n{}", access_mode, text);
        Ok(CompiledStatement {
            statement: text,
            parameters: self.params.into_map(),
            access_mode,
            shape,
        })
    }
}

/// Compiles root fields for one caller.
pub struct Translator<'a> {
    schema: &'a GraphSchema,
    claims: Option<&'a Claims>,
    max_depth: u32,
    global_authentication: bool,
}

impl<'a> Translator<'a> {
    pub fn new(schema: &'a GraphSchema, claims: Option<&'a Claims>, max_depth: u32) -> Self {
        Translator {
            schema,
            claims,
            max_depth,
            global_authentication: false,
        }
    }

    /// Translator honouring the depth limit and global authentication of `config`.
    pub fn with_config(schema: &'a GraphSchema, claims: Option<&'a Claims>, config: &CompilerConfig) -> Self {
        Translator {
            schema,
            claims,
            max_depth: config.max_selection_depth,
            global_authentication: config.global_authentication,
        }
    }

    pub fn translate(
        &self,
        operation: OperationKind,
        node_type: &str,
        field: &FieldSelection,
    ) -> Result<CompiledStatement, TranslationError> {
        if self.global_authentication && self.claims.is_none() {
            return Err(TranslationError::Authentication(GLOBAL_AUTH_MESSAGE.to_string()));
        }
        log::debug!("Translating {} of {} ({})", operation, node_type, field.name);
        let node = self.schema.node(node_type)?;
        let walker = SelectionWalker::new(self.schema, self.max_depth);
        let context = Context::new(self.schema, self.claims);
        match operation {
            OperationKind::Read => read::compile(context, &walker.read(node, field)?),
            OperationKind::Create => mutation::create::compile(context, &walker.create(node, field)?),
            OperationKind::Update => mutation::update::compile(context, &walker.update(node, field)?),
            OperationKind::Delete => mutation::delete::compile(context, &walker.delete(node, field)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_catalog::testing::test_schema;
    use crate::selection::leaves;
    use serde_json::json;

    #[test]
    fn test_global_authentication_applies_to_direct_translation() {
        let schema = test_schema();
        let config = CompilerConfig {
            global_authentication: true,
            ..Default::default()
        };
        let field = FieldSelection::new("people").select(leaves(&["name"]));

        let error = Translator::with_config(&schema, None, &config)
            .translate(OperationKind::Read, "Person", &field)
            .unwrap_err();
        assert_eq!(error, TranslationError::Authentication(GLOBAL_AUTH_MESSAGE.to_string()));

        let claims = Claims::from_payload(json!({"sub": "u1"}), "roles");
        assert!(Translator::with_config(&schema, Some(&claims), &config)
            .translate(OperationKind::Read, "Person", &field)
            .is_ok());
        assert!(Translator::new(&schema, None, 16)
            .translate(OperationKind::Read, "Person", &field)
            .is_ok());
    }
}
