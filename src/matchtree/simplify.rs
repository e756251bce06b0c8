// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Pre-query simplification: rewrite `Repo{pattern}` atoms against the
//! current shard's name, then flatten/collapse boolean structure.

use crate::query::Query;

/// Replace every `Repo{pattern}` atom with `Const(contains(shard_repo_name,
/// pattern))`, then run boolean simplification to a fixed point.
pub fn simplify(query: Query, shard_repo_name: &str) -> Query {
    let rewritten = resolve_repo(query, shard_repo_name);
    let mut current = rewritten;
    loop {
        let next = simplify_once(current.clone());
        if next == current {
            return next;
        }
        current = next;
    }
}

fn resolve_repo(query: Query, repo_name: &str) -> Query {
    match query {
        Query::Repo { pattern } => Query::Const(repo_name.contains(pattern.as_str())),
        Query::And(children) => Query::And(children.into_iter().map(|c| resolve_repo(c, repo_name)).collect()),
        Query::Or(children) => Query::Or(children.into_iter().map(|c| resolve_repo(c, repo_name)).collect()),
        Query::Not(child) => Query::Not(Box::new(resolve_repo(*child, repo_name))),
        Query::Symbol(child) => Query::Symbol(Box::new(resolve_repo(*child, repo_name))),
        other => other,
    }
}

fn simplify_once(query: Query) -> Query {
    match query {
        Query::Not(child) => {
            let child = simplify_once(*child);
            match child {
                Query::Not(inner) => *inner,
                Query::Const(b) => Query::Const(!b),
                other => Query::Not(Box::new(other)),
            }
        }
        Query::And(children) => {
            let mut flat = Vec::new();
            for c in children {
                match simplify_once(c) {
                    Query::And(inner) => flat.extend(inner),
                    Query::Const(true) => {}
                    Query::Const(false) => return Query::Const(false),
                    other => flat.push(other),
                }
            }
            dedup(&mut flat);
            match flat.len() {
                0 => Query::Const(true),
                1 => flat.into_iter().next().unwrap(),
                _ => Query::And(flat),
            }
        }
        Query::Or(children) => {
            let mut flat = Vec::new();
            for c in children {
                match simplify_once(c) {
                    Query::Or(inner) => flat.extend(inner),
                    Query::Const(false) => {}
                    Query::Const(true) => return Query::Const(true),
                    other => flat.push(other),
                }
            }
            dedup(&mut flat);
            match flat.len() {
                0 => Query::Const(false),
                1 => flat.into_iter().next().unwrap(),
                _ => Query::Or(flat),
            }
        }
        Query::Symbol(child) => Query::Symbol(Box::new(simplify_once(*child))),
        other => other,
    }
}

fn dedup(children: &mut Vec<Query>) {
    let mut seen = Vec::new();
    children.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(c.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_negation_cancels() {
        let q = Query::not(Query::not(Query::substring("x")));
        assert_eq!(simplify(q, "repo"), Query::substring("x"));
    }

    #[test]
    fn and_with_const_true_collapses() {
        let q = Query::and([Query::substring("x"), Query::Const(true)]);
        assert_eq!(simplify(q, "repo"), Query::substring("x"));
    }

    #[test]
    fn or_with_const_false_collapses() {
        let q = Query::or([Query::substring("x"), Query::Const(false)]);
        assert_eq!(simplify(q, "repo"), Query::substring("x"));
    }

    #[test]
    fn and_with_const_false_short_circuits() {
        let q = Query::and([Query::substring("x"), Query::Const(false)]);
        assert_eq!(simplify(q, "repo"), Query::Const(false));
    }

    #[test]
    fn repo_atom_resolves_against_shard_name() {
        let q = Query::Repo {
            pattern: "foo".to_string(),
        };
        assert_eq!(simplify(q.clone(), "foo/bar"), Query::Const(true));
        assert_eq!(simplify(q, "baz/qux"), Query::Const(false));
    }

    #[test]
    fn duplicate_children_are_deduped() {
        let q = Query::and([Query::substring("x"), Query::substring("x")]);
        assert_eq!(simplify(q, "repo"), Query::substring("x"));
    }
}
