//! graphql-cypher - GraphQL to Cypher compiler
//!
//! This crate turns a typed GraphQL selection into a single parameterized
//! Cypher statement through:
//! - A metadata registry of node types, relationships and auth rules
//! - Authorization predicates compiled into the statement itself
//! - Nested reads as correlated `CALL` subqueries
//! - Nested mutations with post-write integrity validation
//! - Result folding back into the requested shape

pub mod auth;
pub mod config;
pub mod cypher;
pub mod errors;
pub mod execution;
pub mod graph_catalog;
pub mod selection;
pub mod service;
pub mod translate;

pub use errors::TranslationError;
pub use service::{GraphRequest, GraphResponse, GraphService};
pub use translate::{CompiledStatement, OperationKind, Translator};
