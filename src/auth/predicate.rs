//! Compiles declarative auth rules into Cypher predicates.
//!
//! Every rule is reduced to a three-valued [`Predicate`]: statically true,
//! statically false, or a dynamic boolean expression over the node variable.
//! Static results let the caller fail (or skip a check) at compile time;
//! only dynamic results reach the statement. Claim values and rule literals
//! are always bound through the parameter table.

use serde_json::Value;

use super::claims::Claims;
use super::codes;
use crate::cypher::{quote, ParameterTable};
use crate::errors::TranslationError;
use crate::graph_catalog::{
    AuthOperation, AuthPredicate, AuthRule, AuthValue, GraphSchema, NodeType,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Static(bool),
    Dynamic(String),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Static(false), _) | (_, Predicate::Static(false)) => Predicate::Static(false),
            (Predicate::Static(true), p) | (p, Predicate::Static(true)) => p,
            (Predicate::Dynamic(a), Predicate::Dynamic(b)) => {
                Predicate::Dynamic(format!("({} AND {})", a, b))
            }
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Static(true), _) | (_, Predicate::Static(true)) => Predicate::Static(true),
            (Predicate::Static(false), p) | (p, Predicate::Static(false)) => p,
            (Predicate::Dynamic(a), Predicate::Dynamic(b)) => {
                Predicate::Dynamic(format!("({} OR {})", a, b))
            }
        }
    }

    pub fn render(&self) -> String {
        match self {
            Predicate::Static(value) => value.to_string(),
            Predicate::Dynamic(text) => text.clone(),
        }
    }
}

/// Which part of a rule is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Checked before the operation; failure is forbidden
    Allow,
    /// Checked after a write; failure is forbidden
    Bind,
    /// Filters the matched nodes silently
    Where,
}

impl RuleKind {
    fn select(self, rule: &AuthRule) -> Option<&AuthPredicate> {
        match self {
            RuleKind::Allow => rule.allow.as_ref(),
            RuleKind::Bind => rule.bind.as_ref(),
            RuleKind::Where => rule.where_predicate.as_ref(),
        }
    }
}

/// `CALL apoc.util.validate(NOT (<predicate>), '<code>', [0])` body
pub fn validate_call(predicate: &str, message: &str) -> String {
    format!(
        "apoc.util.validate(NOT ({}), {}, [0])",
        predicate,
        quote(message)
    )
}

/// Validation body raising the forbidden code when `predicate` fails
pub fn forbidden_check(predicate: &str) -> String {
    validate_call(predicate, codes::FORBIDDEN)
}

pub struct AuthCompiler<'a> {
    schema: &'a GraphSchema,
    claims: Option<&'a Claims>,
}

impl<'a> AuthCompiler<'a> {
    pub fn new(schema: &'a GraphSchema, claims: Option<&'a Claims>) -> Self {
        AuthCompiler { schema, claims }
    }

    pub fn claims(&self) -> Option<&'a Claims> {
        self.claims
    }

    /// Fail when a rule for `operation` demands an authenticated caller and
    /// there are no claims.
    pub fn check_authentication(
        &self,
        rules: &[AuthRule],
        operation: AuthOperation,
    ) -> Result<(), TranslationError> {
        if self.claims.is_some() {
            return Ok(());
        }
        let demands = |rule: &AuthRule| {
            rule.applies_to(operation) && rule.is_authenticated == Some(true) && !rule.allow_unauthenticated
        };
        if rules.iter().any(|r| demands(r) || r.and.iter().any(demands)) {
            log::debug!("Rejecting unauthenticated {:?} operation", operation);
            return Err(TranslationError::unauthenticated());
        }
        Ok(())
    }

    /// Node-level predicate of `kind` for `operation`, or `None` when no
    /// rule constrains it.
    ///
    /// `Allow`/`Bind` fail with `Forbidden` when the result is statically
    /// false. A statically true result is reported as `None`.
    pub fn node_predicate(
        &self,
        node: &NodeType,
        operation: AuthOperation,
        kind: RuleKind,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<Option<String>, TranslationError> {
        self.check_authentication(&node.auth, operation)?;
        self.rules_predicate(&node.auth, node, operation, kind, variable, params)
    }

    /// Predicate for the rules attached to one property of `node`.
    pub fn field_predicate(
        &self,
        node: &NodeType,
        field: &str,
        operation: AuthOperation,
        kind: RuleKind,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<Option<String>, TranslationError> {
        let rules = match node.property(field) {
            Some(property) if !property.auth.is_empty() => &property.auth,
            _ => return Ok(None),
        };
        self.check_authentication(rules, operation)?;
        self.rules_predicate(rules, node, operation, kind, variable, params)
    }

    fn rules_predicate(
        &self,
        rules: &[AuthRule],
        node: &NodeType,
        operation: AuthOperation,
        kind: RuleKind,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<Option<String>, TranslationError> {
        let mut combined: Option<Predicate> = None;
        for rule in rules.iter().filter(|r| r.applies_to(operation)) {
            if let Some(predicate) = self.rule_predicate(rule, node, kind, variable, params)? {
                combined = Some(match combined {
                    None => predicate,
                    Some(existing) => existing.or(predicate),
                });
            }
        }

        match (kind, combined) {
            (_, None) | (_, Some(Predicate::Static(true))) => Ok(None),
            (RuleKind::Allow | RuleKind::Bind, Some(Predicate::Static(false))) => {
                log::debug!("{:?} rule on {} is statically false", kind, node.name);
                Err(TranslationError::forbidden())
            }
            (_, Some(predicate)) => Ok(Some(predicate.render())),
        }
    }

    /// `None` when the rule has nothing to say about `kind`.
    fn rule_predicate(
        &self,
        rule: &AuthRule,
        node: &NodeType,
        kind: RuleKind,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<Option<Predicate>, TranslationError> {
        let mut parts = Vec::new();

        if let Some(predicate) = kind.select(rule) {
            parts.push(self.compile(predicate, rule, node, kind, variable, params)?);
        }

        let mut and_parts = Vec::new();
        for nested in &rule.and {
            if let Some(p) = self.rule_predicate(nested, node, kind, variable, params)? {
                and_parts.push(p);
            }
        }
        if !and_parts.is_empty() {
            parts.push(and_parts.into_iter().fold(Predicate::Static(true), Predicate::and));
        }

        let mut or_parts = Vec::new();
        for nested in &rule.or {
            if let Some(p) = self.rule_predicate(nested, node, kind, variable, params)? {
                or_parts.push(p);
            }
        }
        if !or_parts.is_empty() {
            parts.push(or_parts.into_iter().fold(Predicate::Static(false), Predicate::or));
        }

        let roles_apply = !rule.roles.is_empty() && (kind == RuleKind::Allow || !parts.is_empty());
        if roles_apply {
            parts.push(self.roles_predicate(rule, kind)?);
        }

        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(parts.into_iter().fold(Predicate::Static(true), Predicate::and)))
    }

    fn roles_predicate(&self, rule: &AuthRule, kind: RuleKind) -> Result<Predicate, TranslationError> {
        match self.claims {
            Some(claims) if claims.has_any_role(&rule.roles) => Ok(Predicate::Static(true)),
            Some(_) if kind == RuleKind::Bind => Err(TranslationError::forbidden()),
            Some(_) => Ok(Predicate::Static(false)),
            None if rule.allow_unauthenticated => Ok(Predicate::Static(false)),
            None => Err(TranslationError::unauthenticated()),
        }
    }

    fn compile(
        &self,
        predicate: &AuthPredicate,
        rule: &AuthRule,
        node: &NodeType,
        kind: RuleKind,
        variable: &str,
        params: &mut ParameterTable,
    ) -> Result<Predicate, TranslationError> {
        match predicate {
            AuthPredicate::Any => Ok(Predicate::Static(true)),
            AuthPredicate::And(items) => {
                let mut result = Predicate::Static(true);
                for item in items {
                    result = result.and(self.compile(item, rule, node, kind, variable, params)?);
                }
                Ok(result)
            }
            AuthPredicate::Or(items) => {
                let mut result = Predicate::Static(false);
                for item in items {
                    result = result.or(self.compile(item, rule, node, kind, variable, params)?);
                }
                Ok(result)
            }
            AuthPredicate::Equals { field, value } => {
                let property = node.property(field).ok_or_else(|| {
                    TranslationError::schema(format!(
                        "Auth rule on {} references unknown field {}",
                        node.name, field
                    ))
                })?;
                let value = match value {
                    AuthValue::Literal(literal) => literal.clone(),
                    AuthValue::Claim(path) => match self.claim_value(path, rule)? {
                        Some(value) => value,
                        None => return Ok(Predicate::Static(false)),
                    },
                };
                let param = params.add(&format!("{}_auth", variable), value);
                let db = property.db_name();
                Ok(Predicate::Dynamic(format!(
                    "({var}.{db} IS NOT NULL AND {var}.{db} = {param})",
                    var = variable,
                    db = db,
                    param = param
                )))
            }
            AuthPredicate::Relationship { field, predicate } => {
                let relationship = node.relationship(field).ok_or_else(|| {
                    TranslationError::schema(format!(
                        "Auth rule on {} references unknown field {}",
                        node.name, field
                    ))
                })?;
                let targets = self.schema.targets_of(relationship)?;
                let target = match targets.as_slice() {
                    [single] => *single,
                    _ => {
                        return Err(TranslationError::schema(format!(
                            "Auth rules cannot traverse union field {}.{}",
                            node.name, field
                        )))
                    }
                };
                let related = format!("{}_{}_auth", variable, field);
                let inner = self.compile(predicate, rule, target, kind, &related, params)?;
                let quantifier = if kind == RuleKind::Bind { "all" } else { "any" };
                Ok(Predicate::Dynamic(format!(
                    "{q}({rel} IN [({var}){pattern}({rel}{labels}) | {rel}] WHERE {inner})",
                    q = quantifier,
                    rel = related,
                    var = variable,
                    pattern = relationship.pattern(None),
                    labels = target.label_string(),
                    inner = inner.render()
                )))
            }
        }
    }

    /// Claim value for `path`. `Ok(None)` means the predicate can never hold.
    fn claim_value(&self, path: &str, rule: &AuthRule) -> Result<Option<Value>, TranslationError> {
        match self.claims {
            Some(claims) => Ok(claims.get(path).cloned()),
            None if rule.allow_unauthenticated => Ok(None),
            None => Err(TranslationError::unauthenticated()),
        }
    }
}
