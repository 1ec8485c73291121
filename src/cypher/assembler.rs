//! Checks a fragment tree against Cypher's clause ordering and variable
//! scoping rules, then renders it to statement text.

use std::collections::HashSet;

use super::errors::AssemblyError;
use super::params::{referenced_parameters, ParameterTable};
use super::statement::{Clause, ClauseKind, Fragment, Statement, Subquery};

const INDENT: &str = "    ";

/// Validate `statement` and render it. Every `$name` in the rendered text is
/// guaranteed to exist in `params`.
pub fn assemble(statement: &Statement, params: &ParameterTable) -> Result<String, AssemblyError> {
    if statement.is_empty() {
        return Err(AssemblyError::EmptyStatement);
    }
    let outcome = check_block(statement, HashSet::new(), params)?;
    if outcome.columns.is_none() && !outcome.last.is_write() {
        return Err(AssemblyError::MissingReturn);
    }
    Ok(render_block(statement, 0).join("\n"))
}

struct BlockOutcome {
    /// Columns of the closing RETURN, if any
    columns: Option<Vec<String>>,
    last: ClauseKind,
}

fn check_block(
    statement: &Statement,
    mut scope: HashSet<String>,
    params: &ParameterTable,
) -> Result<BlockOutcome, AssemblyError> {
    let mut previous: Option<ClauseKind> = None;
    let mut after_write = false;
    let mut columns: Option<Vec<String>> = None;

    for fragment in statement.fragments() {
        let kind = fragment.kind();

        if columns.is_some() && !matches!(kind, ClauseKind::OrderBy | ClauseKind::Skip | ClauseKind::Limit) {
            return Err(AssemblyError::ClauseAfterReturn {
                clause: kind.to_string(),
            });
        }
        check_order(kind, previous, after_write)?;

        match fragment {
            Fragment::Clause(clause) => {
                check_clause(clause, &scope, columns.as_deref(), params)?;
                match kind {
                    ClauseKind::With => scope = clause.binds.iter().cloned().collect(),
                    ClauseKind::Return => columns = Some(clause.binds.clone()),
                    _ => scope.extend(clause.binds.iter().cloned()),
                }
            }
            Fragment::Subquery(subquery) => {
                for column in check_subquery(subquery, &scope, params)? {
                    if !scope.insert(column.clone()) {
                        return Err(AssemblyError::AlreadyBound { variable: column });
                    }
                }
            }
        }

        if kind.is_write() {
            after_write = true;
        } else if kind == ClauseKind::With {
            after_write = false;
        }
        previous = Some(kind);
    }

    Ok(BlockOutcome {
        columns,
        last: previous.unwrap_or(ClauseKind::Return),
    })
}

fn check_order(
    kind: ClauseKind,
    previous: Option<ClauseKind>,
    after_write: bool,
) -> Result<(), AssemblyError> {
    use ClauseKind::*;

    let allowed = match kind {
        Where => matches!(previous, Some(Match | OptionalMatch | With)),
        OrderBy => matches!(previous, Some(With | Return)),
        Skip => matches!(previous, Some(With | Return | OrderBy)),
        Limit => matches!(previous, Some(With | Return | OrderBy | Skip)),
        _ => !(kind.is_reading() && after_write),
    };
    if allowed {
        Ok(())
    } else {
        Err(AssemblyError::ClauseOrder {
            clause: kind.to_string(),
            previous: previous.map_or_else(|| "start of statement".to_string(), |p| p.to_string()),
        })
    }
}

fn check_clause(
    clause: &Clause,
    scope: &HashSet<String>,
    columns: Option<&[String]>,
    params: &ParameterTable,
) -> Result<(), AssemblyError> {
    for variable in &clause.uses {
        let visible = scope.contains(variable)
            || columns.map_or(false, |cols| cols.iter().any(|c| c == variable));
        if !visible {
            return Err(AssemblyError::UnboundVariable {
                variable: variable.clone(),
                clause: clause.kind.to_string(),
            });
        }
    }
    for name in referenced_parameters(&clause.text) {
        if !params.contains(&name) {
            return Err(AssemblyError::UnknownParameter { name });
        }
    }
    Ok(())
}

/// Returns the columns the subquery adds to the outer scope.
fn check_subquery(
    subquery: &Subquery,
    scope: &HashSet<String>,
    params: &ParameterTable,
) -> Result<Vec<String>, AssemblyError> {
    for import in &subquery.imports {
        if !scope.contains(import) {
            return Err(AssemblyError::UnboundVariable {
                variable: import.clone(),
                clause: ClauseKind::Call.to_string(),
            });
        }
    }

    let mut expected: Option<Vec<String>> = None;
    for branch in &subquery.branches {
        if branch.is_empty() {
            return Err(AssemblyError::EmptyStatement);
        }
        let imported = subquery.imports.iter().cloned().collect();
        let outcome = check_block(branch, imported, params)?;
        let columns = outcome.columns.ok_or(AssemblyError::MissingReturn)?;
        match &expected {
            Some(left) if *left != columns => {
                return Err(AssemblyError::UnionColumnMismatch {
                    left: left.clone(),
                    right: columns,
                })
            }
            Some(_) => {}
            None => expected = Some(columns),
        }
    }
    expected.ok_or(AssemblyError::EmptyStatement)
}

fn render_block(statement: &Statement, depth: usize) -> Vec<String> {
    let pad = INDENT.repeat(depth);
    let mut lines = Vec::new();
    for fragment in statement.fragments() {
        match fragment {
            Fragment::Clause(clause) => lines.push(format!("{}{}", pad, clause.text)),
            Fragment::Subquery(subquery) => {
                lines.push(format!("{}CALL {{", pad));
                for (i, branch) in subquery.branches.iter().enumerate() {
                    if i > 0 {
                        lines.push(format!("{}UNION", pad));
                    }
                    if !subquery.imports.is_empty() {
                        lines.push(format!(
                            "{}{}WITH {}",
                            pad,
                            INDENT,
                            subquery.imports.join(", ")
                        ));
                    }
                    lines.extend(render_block(branch, depth + 1));
                }
                lines.push(format!("{}}}", pad));
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_read() -> (Statement, ParameterTable) {
        let mut params = ParameterTable::new();
        let title = params.add("this", json!("The Matrix"));

        let mut inner = Statement::new();
        inner
            .match_pattern("(this)<-[:ACTED_IN]-(this_actors:Actor)", &["this_actors"], &["this"])
            .return_items(
                "collect(this_actors { .name }) AS this_actors",
                &["this_actors"],
                &["this_actors"],
            );

        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .where_clause(&format!("this.title = {}", title), &["this"])
            .call(Subquery::new(&["this"], inner))
            .return_items(
                "this { .title, actors: this_actors } AS this",
                &["this"],
                &["this", "this_actors"],
            );
        (statement, params)
    }

    #[test]
    fn test_renders_nested_subquery() {
        let (statement, params) = nested_read();
        let text = assemble(&statement, &params).unwrap();
        assert_eq!(
            text,
            "MATCH (this:Movie)\n\
             WHERE this.title = $this_param0\n\
             CALL {\n\
             \x20   WITH this\n\
             \x20   MATCH (this)<-[:ACTED_IN]-(this_actors:Actor)\n\
             \x20   RETURN collect(this_actors { .name }) AS this_actors\n\
             }\n\
             RETURN this { .title, actors: this_actors } AS this"
        );
    }

    #[test]
    fn test_unknown_parameter() {
        let (statement, _) = nested_read();
        assert_eq!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::UnknownParameter {
                name: "this_param0".to_string()
            })
        );
    }

    #[test]
    fn test_unbound_variable() {
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .with(&["this"])
            .return_items("other AS other", &["other"], &["other"]);
        assert!(matches!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::UnboundVariable { variable, .. }) if variable == "other"
        ));
    }

    #[test]
    fn test_with_narrows_scope() {
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)-[:IN]->(genre:Genre)", &["this", "genre"], &[])
            .with(&["this"])
            .return_items("genre", &["genre"], &["genre"]);
        assert!(matches!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn test_reading_after_write_needs_with() {
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .set(&["this.title = 'x'".to_string()], &["this"])
            .procedure("apoc.util.validate(false, '', [0])", &[]);
        assert!(matches!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::ClauseOrder { .. })
        ));

        let mut fixed = Statement::new();
        fixed
            .match_pattern("(this:Movie)", &["this"], &[])
            .set(&["this.title = 'x'".to_string()], &["this"])
            .with(&["this"])
            .procedure("apoc.util.validate(false, '', [0])", &[])
            .return_items("this", &["this"], &["this"]);
        assert!(assemble(&fixed, &ParameterTable::new()).is_ok());
    }

    #[test]
    fn test_where_must_follow_match_or_with() {
        let mut statement = Statement::new();
        statement
            .create("(this0:Movie)", &["this0"], &[])
            .where_clause("true", &[]);
        assert!(matches!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::ClauseOrder { .. })
        ));
    }

    #[test]
    fn test_nothing_after_return() {
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .return_items("this", &["this"], &["this"])
            .match_pattern("(other:Movie)", &["other"], &[]);
        assert_eq!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::ClauseAfterReturn {
                clause: "MATCH".to_string()
            })
        );
    }

    #[test]
    fn test_union_branches_must_agree() {
        let mut movie = Statement::new();
        movie
            .match_pattern("(this)-[:IN]->(m:Movie)", &["m"], &["this"])
            .return_items("m AS result", &["result"], &["m"]);
        let mut series = Statement::new();
        series
            .match_pattern("(this)-[:IN]->(s:Series)", &["s"], &["this"])
            .return_items("s AS other", &["other"], &["s"]);

        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Actor)", &["this"], &[])
            .call(Subquery::union(&["this"], vec![movie, series]))
            .return_items("this", &["this"], &["this"]);
        assert!(matches!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::UnionColumnMismatch { .. })
        ));
    }

    #[test]
    fn test_subquery_column_cannot_shadow_outer_variable() {
        let subquery = |column: &str| {
            let mut inner = Statement::new();
            inner
                .match_pattern("(this)<-[:ACTED_IN]-(a:Actor)", &["a"], &["this"])
                .return_items(&format!("count(a) AS {}", column), &[column], &["a"]);
            Subquery::new(&["this"], inner)
        };
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .call(subquery("this_actors0"))
            .call(subquery("this_actors0"))
            .return_items("this_actors0", &["this_actors0"], &["this_actors0"]);
        assert_eq!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::AlreadyBound {
                variable: "this_actors0".to_string()
            })
        );
    }

    #[test]
    fn test_subquery_needs_return() {
        let mut inner = Statement::new();
        inner.match_pattern("(this)-[:IN]->(g:Genre)", &["g"], &["this"]);
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .call(Subquery::new(&["this"], inner))
            .return_items("this", &["this"], &["this"]);
        assert_eq!(
            assemble(&statement, &ParameterTable::new()),
            Err(AssemblyError::MissingReturn)
        );
    }

    #[test]
    fn test_statement_may_end_in_write() {
        let mut statement = Statement::new();
        statement
            .match_pattern("(this:Movie)", &["this"], &[])
            .delete(&["this"], true);
        assert_eq!(
            assemble(&statement, &ParameterTable::new()).unwrap(),
            "MATCH (this:Movie)\nDETACH DELETE this"
        );
        assert_eq!(
            assemble(&Statement::new(), &ParameterTable::new()),
            Err(AssemblyError::EmptyStatement)
        );
    }
}
