pub mod claims;
pub mod predicate;

pub use claims::{Claims, ClaimsError, ClaimsVerifier, UnverifiedJwtDecoder};
pub use predicate::{forbidden_check, validate_call, AuthCompiler, Predicate, RuleKind};

/// Codes embedded in `apoc.util.validate` messages. The engine echoes them
/// back in its failure text, which is how they are mapped to typed errors.
pub mod codes {
    pub const FORBIDDEN: &str = "@graphql-cypher/FORBIDDEN";
    pub const UNAUTHENTICATED: &str = "@graphql-cypher/UNAUTHENTICATED";
    /// Followed directly by `<Type>.<field> required`
    pub const RELATIONSHIP_REQUIRED: &str = "@graphql-cypher/RELATIONSHIP-REQUIRED";
}

/// Message used when global authentication rejects a request.
pub const GLOBAL_AUTH_MESSAGE: &str = "Global authentication requires a valid JWT token";
