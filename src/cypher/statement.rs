//! Append-only fragment list for one Cypher statement.
//!
//! Compilers push clauses in emission order together with the variables each
//! clause binds and references. Nothing is rendered until the assembler has
//! checked the whole tree, so a misplaced fragment surfaces as an
//! [`AssemblyError`](super::errors::AssemblyError) rather than as invalid
//! text sent to the engine.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Match,
    OptionalMatch,
    Unwind,
    /// Standalone procedure call such as `apoc.util.validate`
    Procedure,
    /// `CALL { ... }` subquery
    Call,
    Where,
    Create,
    Merge,
    Set,
    Delete,
    Foreach,
    With,
    OrderBy,
    Skip,
    Limit,
    Return,
}

impl ClauseKind {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ClauseKind::Create
                | ClauseKind::Merge
                | ClauseKind::Set
                | ClauseKind::Delete
                | ClauseKind::Foreach
        )
    }

    /// Clauses that need a `WITH` between them and a preceding write
    pub fn is_reading(&self) -> bool {
        matches!(
            self,
            ClauseKind::Match
                | ClauseKind::OptionalMatch
                | ClauseKind::Unwind
                | ClauseKind::Procedure
                | ClauseKind::Call
        )
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let keyword = match self {
            ClauseKind::Match => "MATCH",
            ClauseKind::OptionalMatch => "OPTIONAL MATCH",
            ClauseKind::Unwind => "UNWIND",
            ClauseKind::Procedure => "CALL procedure",
            ClauseKind::Call => "CALL subquery",
            ClauseKind::Where => "WHERE",
            ClauseKind::Create => "CREATE",
            ClauseKind::Merge => "MERGE",
            ClauseKind::Set => "SET",
            ClauseKind::Delete => "DELETE",
            ClauseKind::Foreach => "FOREACH",
            ClauseKind::With => "WITH",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Skip => "SKIP",
            ClauseKind::Limit => "LIMIT",
            ClauseKind::Return => "RETURN",
        };
        write!(f, "{}", keyword)
    }
}

/// One rendered clause plus its variable bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub text: String,
    /// Variables introduced by this clause. For `WITH` this is the complete
    /// new scope; for `RETURN` these are the returned column names.
    pub binds: Vec<String>,
    /// Variables that must already be in scope
    pub uses: Vec<String>,
}

/// `CALL { ... }` with one branch per `UNION` member.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub imports: Vec<String>,
    pub branches: Vec<Statement>,
}

impl Subquery {
    pub fn new(imports: &[&str], body: Statement) -> Self {
        Subquery {
            imports: owned(imports),
            branches: vec![body],
        }
    }

    pub fn union(imports: &[&str], branches: Vec<Statement>) -> Self {
        Subquery {
            imports: owned(imports),
            branches,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Clause(Clause),
    Subquery(Subquery),
}

impl Fragment {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Fragment::Clause(clause) => clause.kind,
            Fragment::Subquery(_) => ClauseKind::Call,
        }
    }
}

fn owned(vars: &[&str]) -> Vec<String> {
    vars.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    fragments: Vec<Fragment>,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn push(&mut self, fragment: Fragment) -> &mut Self {
        self.fragments.push(fragment);
        self
    }

    pub fn extend(&mut self, other: Statement) -> &mut Self {
        self.fragments.extend(other.fragments);
        self
    }

    fn clause(&mut self, kind: ClauseKind, text: String, binds: &[&str], uses: &[&str]) -> &mut Self {
        self.push(Fragment::Clause(Clause {
            kind,
            text,
            binds: owned(binds),
            uses: owned(uses),
        }))
    }

    pub fn match_pattern(&mut self, pattern: &str, binds: &[&str], uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Match, format!("MATCH {}", pattern), binds, uses)
    }

    pub fn optional_match(&mut self, pattern: &str, binds: &[&str], uses: &[&str]) -> &mut Self {
        self.clause(
            ClauseKind::OptionalMatch,
            format!("OPTIONAL MATCH {}", pattern),
            binds,
            uses,
        )
    }

    pub fn where_clause(&mut self, predicate: &str, uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Where, format!("WHERE {}", predicate), &[], uses)
    }

    /// `WITH a, b` keeping exactly the listed variables in scope
    pub fn with(&mut self, vars: &[&str]) -> &mut Self {
        self.clause(ClauseKind::With, format!("WITH {}", vars.join(", ")), vars, vars)
    }

    /// `WITH <items>` where `scope` is the complete resulting scope
    pub fn with_items(&mut self, items: &str, scope: &[&str], uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::With, format!("WITH {}", items), scope, uses)
    }

    pub fn call(&mut self, subquery: Subquery) -> &mut Self {
        self.push(Fragment::Subquery(subquery))
    }

    pub fn procedure(&mut self, call: &str, uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Procedure, format!("CALL {}", call), &[], uses)
    }

    pub fn create(&mut self, pattern: &str, binds: &[&str], uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Create, format!("CREATE {}", pattern), binds, uses)
    }

    pub fn merge(&mut self, pattern: &str, binds: &[&str], uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Merge, format!("MERGE {}", pattern), binds, uses)
    }

    pub fn set(&mut self, assignments: &[String], uses: &[&str]) -> &mut Self {
        self.clause(
            ClauseKind::Set,
            format!("SET {}", assignments.join(", ")),
            &[],
            uses,
        )
    }

    pub fn delete(&mut self, vars: &[&str], detach: bool) -> &mut Self {
        let keyword = if detach { "DETACH DELETE" } else { "DELETE" };
        self.clause(
            ClauseKind::Delete,
            format!("{} {}", keyword, vars.join(", ")),
            &[],
            vars,
        )
    }

    pub fn foreach(&mut self, body: &str, uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Foreach, format!("FOREACH ({})", body), &[], uses)
    }

    pub fn order_by(&mut self, keys: &[String], uses: &[&str]) -> &mut Self {
        self.clause(
            ClauseKind::OrderBy,
            format!("ORDER BY {}", keys.join(", ")),
            &[],
            uses,
        )
    }

    pub fn skip(&mut self, param: &str) -> &mut Self {
        self.clause(ClauseKind::Skip, format!("SKIP {}", param), &[], &[])
    }

    pub fn limit(&mut self, param: &str) -> &mut Self {
        self.clause(ClauseKind::Limit, format!("LIMIT {}", param), &[], &[])
    }

    /// `RETURN <items>`; `columns` are the returned names
    pub fn return_items(&mut self, items: &str, columns: &[&str], uses: &[&str]) -> &mut Self {
        self.clause(ClauseKind::Return, format!("RETURN {}", items), columns, uses)
    }
}
