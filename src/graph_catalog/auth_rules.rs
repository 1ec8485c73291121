//! Declarative authorization rules attached to node kinds and property fields.
//!
//! Rules are parsed once, while the registry is built, from the loose
//! `allow` / `bind` / `where` objects of a schema definition into the closed
//! [`AuthPredicate`] tree. String values of the form `$jwt.<path>` reference
//! a claim of the caller's token; every other scalar is a literal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::GraphSchemaError;

/// Prefix marking a claim reference inside a rule predicate.
pub const JWT_PREFIX: &str = "$jwt.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthOperation {
    Create,
    Read,
    Update,
    Delete,
    Connect,
    Disconnect,
}

/// Right-hand side of an equality inside a rule predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthValue {
    /// Dotted claim path, without the `$jwt.` prefix
    Claim(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthPredicate {
    /// `"*"`: any node passes
    Any,
    Equals { field: String, value: AuthValue },
    /// Descends through a relationship field; the nested predicate applies to related nodes
    Relationship {
        field: String,
        predicate: Box<AuthPredicate>,
    },
    And(Vec<AuthPredicate>),
    Or(Vec<AuthPredicate>),
}

impl AuthPredicate {
    /// Parse a predicate object from a schema definition.
    pub fn from_value(value: &Value, type_name: &str) -> Result<Self, GraphSchemaError> {
        match value {
            Value::String(s) if s == "*" => Ok(AuthPredicate::Any),
            Value::Object(map) => {
                if map.is_empty() {
                    return Err(GraphSchemaError::invalid_auth_rule(
                        type_name,
                        "predicate object must not be empty",
                    ));
                }
                let mut parts = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let part = match key.as_str() {
                        "AND" | "OR" => {
                            let items = value.as_array().ok_or_else(|| {
                                GraphSchemaError::invalid_auth_rule(
                                    type_name,
                                    format!("`{}` expects a list of predicates", key),
                                )
                            })?;
                            let nested = items
                                .iter()
                                .map(|item| Self::from_value(item, type_name))
                                .collect::<Result<Vec<_>, _>>()?;
                            if key == "AND" {
                                AuthPredicate::And(nested)
                            } else {
                                AuthPredicate::Or(nested)
                            }
                        }
                        field => match value {
                            Value::Object(_) => AuthPredicate::Relationship {
                                field: field.to_string(),
                                predicate: Box::new(Self::from_value(value, type_name)?),
                            },
                            Value::String(s) if s.starts_with(JWT_PREFIX) => AuthPredicate::Equals {
                                field: field.to_string(),
                                value: AuthValue::Claim(s[JWT_PREFIX.len()..].to_string()),
                            },
                            Value::Array(_) => {
                                return Err(GraphSchemaError::invalid_auth_rule(
                                    type_name,
                                    format!("field `{}` cannot be compared against a list", field),
                                ))
                            }
                            other => AuthPredicate::Equals {
                                field: field.to_string(),
                                value: AuthValue::Literal(other.clone()),
                            },
                        },
                    };
                    parts.push(part);
                }
                if parts.len() == 1 {
                    Ok(parts.remove(0))
                } else {
                    Ok(AuthPredicate::And(parts))
                }
            }
            other => Err(GraphSchemaError::invalid_auth_rule(
                type_name,
                format!("expected \"*\" or an object, found {}", other),
            )),
        }
    }

    pub fn references_claims(&self) -> bool {
        match self {
            AuthPredicate::Any => false,
            AuthPredicate::Equals { value, .. } => matches!(value, AuthValue::Claim(_)),
            AuthPredicate::Relationship { predicate, .. } => predicate.references_claims(),
            AuthPredicate::And(items) | AuthPredicate::Or(items) => {
                items.iter().any(|p| p.references_claims())
            }
        }
    }
}

/// One `auth` rule, after parsing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthRule {
    /// `None` applies the rule to every operation
    pub operations: Option<Vec<AuthOperation>>,
    pub is_authenticated: Option<bool>,
    pub allow_unauthenticated: bool,
    pub allow: Option<AuthPredicate>,
    pub bind: Option<AuthPredicate>,
    pub where_predicate: Option<AuthPredicate>,
    pub roles: Vec<String>,
    pub and: Vec<AuthRule>,
    pub or: Vec<AuthRule>,
}

impl AuthRule {
    pub fn applies_to(&self, operation: AuthOperation) -> bool {
        self.operations
            .as_ref()
            .map_or(true, |ops| ops.contains(&operation))
    }

    /// True when evaluating this rule needs a claims object.
    pub fn references_claims(&self) -> bool {
        [&self.allow, &self.bind, &self.where_predicate]
            .into_iter()
            .flatten()
            .any(|p| p.references_claims())
            || self.and.iter().chain(self.or.iter()).any(|r| r.references_claims())
    }
}

/// Serialized shape of a rule inside a schema definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRuleDefinition {
    #[serde(default)]
    pub operations: Option<Vec<AuthOperation>>,
    #[serde(default)]
    pub is_authenticated: Option<bool>,
    #[serde(default)]
    pub allow_unauthenticated: bool,
    #[serde(default)]
    pub allow: Option<Value>,
    #[serde(default)]
    pub bind: Option<Value>,
    #[serde(default, rename = "where")]
    pub where_predicate: Option<Value>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, rename = "AND")]
    pub and: Vec<AuthRuleDefinition>,
    #[serde(default, rename = "OR")]
    pub or: Vec<AuthRuleDefinition>,
}

impl AuthRuleDefinition {
    pub fn into_rule(self, type_name: &str) -> Result<AuthRule, GraphSchemaError> {
        let parse = |value: Option<Value>| {
            value
                .map(|v| AuthPredicate::from_value(&v, type_name))
                .transpose()
        };
        Ok(AuthRule {
            operations: self.operations,
            is_authenticated: self.is_authenticated,
            allow_unauthenticated: self.allow_unauthenticated,
            allow: parse(self.allow)?,
            bind: parse(self.bind)?,
            where_predicate: parse(self.where_predicate)?,
            roles: self.roles,
            and: self
                .and
                .into_iter()
                .map(|r| r.into_rule(type_name))
                .collect::<Result<_, _>>()?,
            or: self
                .or
                .into_iter()
                .map(|r| r.into_rule(type_name))
                .collect::<Result<_, _>>()?,
        })
    }
}
