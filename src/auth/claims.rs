//! Caller identity
//!
//! Token verification is a pluggable capability: the service holds a
//! [`ClaimsVerifier`] and turns the raw request token into a [`Claims`]
//! object, or into no claims at all when the token is absent or invalid.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClaimsError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token payload is not a JSON object: {0}")]
    InvalidPayload(String),
}

/// Claims carried by a verified token.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Roles extracted from the configured claim path
    pub roles: Vec<String>,
    /// Full decoded payload, addressed with dotted paths
    pub payload: Value,
}

impl Claims {
    /// Build claims from a decoded payload, reading roles from `roles_path`.
    ///
    /// The roles claim may hold a list of strings or a single string.
    pub fn from_payload(payload: Value, roles_path: &str) -> Self {
        let roles = match lookup(&payload, roles_path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(role)) => vec![role.clone()],
            _ => Vec::new(),
        };
        Claims { roles, payload }
    }

    /// Value at a dotted claim path such as `sub` or `org.id`
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.payload, path).filter(|v| !v.is_null())
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Turns a raw bearer token into claims.
pub trait ClaimsVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, ClaimsError>;
}

/// Decodes the payload segment of a JWT without checking its signature.
///
/// Only suitable for development and tests; production deployments plug in
/// a verifying implementation.
#[derive(Debug, Clone)]
pub struct UnverifiedJwtDecoder {
    roles_claim_path: String,
}

impl UnverifiedJwtDecoder {
    pub fn new(roles_claim_path: impl Into<String>) -> Self {
        UnverifiedJwtDecoder {
            roles_claim_path: roles_claim_path.into(),
        }
    }
}

impl Default for UnverifiedJwtDecoder {
    fn default() -> Self {
        Self::new("roles")
    }
}

impl ClaimsVerifier for UnverifiedJwtDecoder {
    fn verify(&self, token: &str) -> Result<Claims, ClaimsError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => {
                return Err(ClaimsError::MalformedToken(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClaimsError::MalformedToken(e.to_string()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ClaimsError::InvalidPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(ClaimsError::InvalidPayload(value.to_string()));
        }
        Ok(Claims::from_payload(value, &self.roles_claim_path))
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &Value) -> String {
    format!(
        "eyJhbGciOiJub25lIn0.{}.signature",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_payload() {
        let token = encode_test_token(&json!({"sub": "user-1", "roles": ["admin"], "org": {"id": 7}}));
        let claims = UnverifiedJwtDecoder::default().verify(&token).unwrap();
        assert_eq!(claims.get("sub"), Some(&json!("user-1")));
        assert_eq!(claims.get("org.id"), Some(&json!(7)));
        assert_eq!(claims.get("org.missing"), None);
        assert!(claims.has_any_role(&["admin".to_string()]));
        assert!(!claims.has_any_role(&["editor".to_string()]));
    }

    #[test]
    fn test_bearer_prefix_and_nested_roles() {
        let token = encode_test_token(&json!({"realm": {"roles": "editor"}}));
        let claims = UnverifiedJwtDecoder::new("realm.roles")
            .verify(&format!("Bearer {}", token))
            .unwrap();
        assert_eq!(claims.roles, vec!["editor".to_string()]);
    }

    #[test]
    fn test_malformed_tokens() {
        let decoder = UnverifiedJwtDecoder::default();
        assert!(matches!(
            decoder.verify("not-a-jwt"),
            Err(ClaimsError::MalformedToken(_))
        ));
        assert!(matches!(
            decoder.verify("a.!!!.c"),
            Err(ClaimsError::MalformedToken(_))
        ));
        let array_payload = format!("h.{}.s", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(matches!(
            decoder.verify(&array_payload),
            Err(ClaimsError::InvalidPayload(_))
        ));
    }
}
