//! Boundary to the external graph engine.
//!
//! The compiler never talks to a database itself. A compiled statement is
//! handed to an [`Executor`] together with its parameters, the access mode
//! it must run under, and any engine query options from the configuration.
//! Implementations are expected to run write statements inside a single
//! transaction so that a failed validation rolls the whole write back.

pub mod errors;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub use errors::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessMode {
    Read,
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "READ"),
            AccessMode::Write => write!(f, "WRITE"),
        }
    }
}

impl std::str::FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "READ" => Ok(AccessMode::Read),
            "WRITE" => Ok(AccessMode::Write),
            other => Err(format!("unknown access mode `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub statement: String,
    pub parameters: Map<String, Value>,
    pub access_mode: AccessMode,
    /// Engine hints, passed through untouched
    pub query_options: BTreeMap<String, String>,
}

/// Counters reported by the engine for a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatistics {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutput {
    /// One map per row, keyed by return alias
    pub rows: Vec<Map<String, Value>>,
    pub stats: UpdateStatistics,
}

impl ExecutionOutput {
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        ExecutionOutput {
            rows,
            stats: UpdateStatistics::default(),
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, request: ExecutionRequest) -> Result<ExecutionOutput, ExecutionError>;
}
