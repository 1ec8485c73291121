use thiserror::Error;

/// Internal invariant violations detected while assembling a statement.
///
/// These are never caused by request input; every variant points at a
/// fragment emitted in the wrong place by the compiler itself.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssemblyError {
    #[error("Variable `{variable}` is referenced by `{clause}` but is not bound at that point")]
    UnboundVariable { variable: String, clause: String },

    #[error("Subquery returns `{variable}`, which is already bound in the enclosing scope")]
    AlreadyBound { variable: String },

    #[error("Parameter `${name}` is referenced but missing from the parameter table")]
    UnknownParameter { name: String },

    #[error("`{clause}` cannot follow `{previous}`")]
    ClauseOrder { clause: String, previous: String },

    #[error("`{clause}` appears after RETURN")]
    ClauseAfterReturn { clause: String },

    #[error("Subquery does not end with RETURN")]
    MissingReturn,

    #[error("UNION branches return different columns: {left:?} vs {right:?}")]
    UnionColumnMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("Statement is empty")]
    EmptyStatement,
}
