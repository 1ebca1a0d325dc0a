//! Fixpoint normalization of filter fragments.

use std::collections::BTreeSet;

use log::trace;
use serde_json::Value;

use crate::filter::fragment::Filter;

/// Simplify a fragment without changing which documents it matches.
///
/// Rewrite passes repeat until a pass produces no change. Every rule either
/// strictly reduces structure or fires at most once (the terms-with-null
/// rewrite grows the tree but removes the nulls that let it fire), so the
/// loop terminates.
pub fn normalize(filter: &Filter) -> Filter {
    let mut current = filter.clone();
    loop {
        let next = normalize_pass(&current);
        if next == current {
            trace!("normalize fixpoint at {} nodes", next.node_count());
            return next;
        }
        current = next;
    }
}

fn normalize_pass(filter: &Filter) -> Filter {
    match filter {
        Filter::MatchAll
        | Filter::MatchNone
        | Filter::Term { .. }
        | Filter::Prefix { .. }
        | Filter::Regexp { .. }
        | Filter::Exists { .. }
        | Filter::Script { .. } => filter.clone(),

        Filter::Range { field, bounds } => {
            if bounds.is_empty() {
                Filter::MatchAll
            } else {
                Filter::Range {
                    field: field.clone(),
                    bounds: bounds.clone(),
                }
            }
        }

        Filter::Terms { field, values } => normalize_terms(field, values),
        Filter::And(subs) => normalize_and(subs),
        Filter::Or(subs) => normalize_or(subs),

        Filter::Not(sub) => match normalize_pass(sub) {
            Filter::MatchAll => Filter::MatchNone,
            Filter::MatchNone => Filter::MatchAll,
            inner => Filter::negate(inner),
        },

        Filter::Nested { path, query } => Filter::nested(path.clone(), normalize_pass(query)),
    }
}

/// A membership test over an empty set matches nothing; an explicit null in
/// the value set really means "the field is missing".
fn normalize_terms(field: &str, values: &[Value]) -> Filter {
    if values.is_empty() {
        return Filter::MatchNone;
    }
    if !values.iter().any(Value::is_null) {
        return Filter::terms(field, values.to_vec());
    }
    let rest: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
    if rest.is_empty() {
        Filter::missing(field)
    } else {
        Filter::or(vec![Filter::missing(field), Filter::terms(field, rest)])
    }
}

fn normalize_and(subs: &[Filter]) -> Filter {
    let mut terms: Vec<Filter> = subs.iter().map(normalize_pass).collect();

    // a later child identical to an earlier one is redundant
    for i in 1..terms.len() {
        if terms[..i].contains(&terms[i]) {
            terms[i] = Filter::MatchAll;
        }
    }

    // a term test on a field already implies the field exists
    let term_fields: BTreeSet<String> = terms
        .iter()
        .filter_map(|t| match t {
            Filter::Term { field, .. } => Some(field.clone()),
            _ => None,
        })
        .collect();
    for t in terms.iter_mut() {
        if let Filter::Exists { field } = t {
            if term_fields.contains(field.as_str()) {
                *t = Filter::MatchAll;
            }
        }
    }

    // two range tests on one field merge into the intersection of bounds
    for i in 0..terms.len() {
        for j in (i + 1)..terms.len() {
            let merged = match (&terms[i], &terms[j]) {
                (
                    Filter::Range { field: f0, bounds: b0 },
                    Filter::Range { field: f1, bounds: b1 },
                ) if f0 == f1 => Some(Filter::Range {
                    field: f0.clone(),
                    bounds: b0.intersect(b1),
                }),
                _ => None,
            };
            if let Some(merged) = merged {
                terms[i] = merged;
                terms[j] = Filter::MatchAll;
            }
        }
    }

    let mut output = Vec::new();
    for t in terms {
        match t {
            Filter::MatchAll => {}
            Filter::MatchNone => return Filter::MatchNone,
            Filter::And(inner) => output.extend(inner),
            other => output.push(other),
        }
    }
    match output.len() {
        0 => Filter::MatchAll,
        1 => output.remove(0),
        _ => Filter::And(output),
    }
}

fn normalize_or(subs: &[Filter]) -> Filter {
    let mut output = Vec::new();
    for sub in subs {
        match normalize_pass(sub) {
            Filter::MatchNone => {}
            Filter::MatchAll => return Filter::MatchAll,
            Filter::Or(inner) => output.extend(inner),
            other => output.push(other),
        }
    }
    match output.len() {
        0 => Filter::MatchNone,
        1 => output.remove(0),
        _ => Filter::Or(output),
    }
}
