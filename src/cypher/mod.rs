pub mod assembler;
pub mod errors;
pub mod params;
pub mod statement;

pub use assembler::assemble;
pub use errors::AssemblyError;
pub use params::ParameterTable;
pub use statement::{Clause, ClauseKind, Fragment, Statement, Subquery};

/// Quote a string for use as a Cypher string literal. Only used for
/// compiler-owned constants such as error codes and type names, never for
/// request data.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}
