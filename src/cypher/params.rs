//! Parameter table for one compilation pass.
//!
//! Every literal that ends up in a statement is stored here and referenced
//! from the statement text as `$name`; nothing user-supplied is ever spliced
//! into the text itself. Names are derived from the bound variable (which
//! already encodes nesting depth and field path) plus a per-scope counter,
//! and an existing entry is never overwritten.

use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    values: Map<String, Value>,
    counters: HashMap<String, usize>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `<scope>_param<n>` and return the `$` reference.
    pub fn add(&mut self, scope: &str, value: Value) -> String {
        let counter = self.counters.entry(scope.to_string()).or_insert(0);
        loop {
            let name = format!("{}_param{}", scope, counter);
            *counter += 1;
            if !self.values.contains_key(&name) {
                self.values.insert(name.clone(), value);
                return format!("${}", name);
            }
        }
    }

    /// Store `value` under `name`, or `name_<n>` when `name` is taken.
    pub fn add_named(&mut self, name: &str, value: Value) -> String {
        let mut candidate = name.to_string();
        let mut suffix = 0;
        while self.values.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{}_{}", name, suffix);
        }
        self.values.insert(candidate.clone(), value);
        format!("${}", candidate)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name.trim_start_matches('$'))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name.trim_start_matches('$'))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// Collect every `$name` parameter reference in statement text, skipping
/// quoted string literals.
pub fn referenced_parameters(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            if ch == '\\' {
                chars.next();
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '$' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if !name.is_empty() {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}
