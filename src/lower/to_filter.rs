//! Per-variant translation of expression nodes into backend filter
//! fragments.
//!
//! Dispatch is an exhaustive match over the expression sum type: adding a
//! variant forces a decision here. Rules that have no structural mapping
//! fall back to the embedded-script form; shapes the backend cannot
//! express at all fail the whole compile.

use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::expression::{Expr, When};
use crate::filter::{Filter, RangeBounds};
use crate::lower::script::{box_value, construct_name, to_es_script, ScriptMiss};
use crate::schema::{JsonType, OrStrategy, Schema};

/// Lower an expression to a backend filter fragment.
///
/// Expects the expression to have been partially evaluated; the rewrites
/// performed here re-run `partial_eval` on any tree they construct.
pub fn to_filter(expr: &Expr, schema: &Schema) -> CompileResult<Filter> {
    match expr {
        Expr::True => Ok(Filter::MatchAll),
        Expr::False | Expr::Null => Ok(Filter::MatchNone),
        Expr::Literal(_) => Err(CompileError::unsupported("bare literal as a filter")),

        Expr::Variable(name) => Ok(lower_variable_exists(name, schema)),

        Expr::And(terms) => {
            let lowered = terms
                .iter()
                .map(|t| to_filter(t, schema))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(Filter::and(lowered))
        }

        Expr::Or(terms) => lower_or(terms, schema),
        Expr::Not(term) => lower_not(term, schema),

        Expr::Eq { lhs, rhs } => lower_eq(lhs, rhs, schema),
        Expr::BasicEq { lhs, rhs } => lower_basic_eq(lhs, rhs, schema),
        Expr::Ne { lhs, rhs } => lower_ne(lhs, rhs, schema),
        Expr::Inequality { op, lhs, rhs } => lower_inequality(*op, lhs, rhs, schema),

        Expr::Missing(term) => lower_missing(term, schema),
        Expr::Exists(term) => to_filter(&Expr::not(term.missing()).partial_eval(), schema),
        Expr::BooleanCast(term) => lower_boolean_cast(term, schema),

        Expr::Prefix { expr, prefix } => lower_prefix(expr, prefix, schema),
        Expr::Suffix { expr, suffix } => lower_suffix(expr, suffix, schema),
        Expr::Contains { expr, find } => lower_contains(expr, find, schema),
        Expr::RegExp { expr, pattern } => lower_regexp(expr, pattern, schema),

        Expr::In { value, superset } => lower_in(value, superset, schema),
        Expr::Case { whens, default } => lower_case(whens, default, schema),

        Expr::Coalesce(terms) => {
            let exists = Expr::or(terms.iter().map(|t| Expr::exists(t.clone())).collect());
            to_filter(&exists.partial_eval(), schema)
        }

        Expr::NestedQuery { path, query } => {
            let inner = to_filter(query, schema)?;
            if path == "." {
                Ok(inner)
            } else {
                Ok(Filter::nested(path.clone(), inner))
            }
        }

        Expr::Script(source) => Ok(Filter::script(source.clone())),

        Expr::Div { .. } => to_filter(&Expr::not(expr.missing()).partial_eval(), schema),

        Expr::StringCast(_) | Expr::Length(_) | Expr::Floor { .. } => Err(
            CompileError::unsupported(format!("{} as a filter", construct_name(expr))),
        ),
        Expr::Tuple(_) | Expr::Leaves(_) => {
            Err(CompileError::unsupported(construct_name(expr)))
        }
    }
}

/// Coerce a JSON value to the boolean a boolean-typed column stores.
fn value_to_boolean(value: &Value) -> Value {
    let b = match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Value::String(s) => !matches!(
            s.to_ascii_lowercase().as_str(),
            "false" | "f" | "0" | ""
        ),
        _ => true,
    };
    Value::Bool(b)
}

/// Existence test per resolved column: boolean columns store an explicit
/// true/false, so existence there is a term test.
fn column_exists_test(col: &crate::schema::Column) -> Filter {
    if col.json_type == JsonType::Boolean {
        Filter::term(col.es_column.clone(), Value::Bool(true))
    } else {
        Filter::exists(col.es_column.clone())
    }
}

fn lower_variable_exists(name: &str, schema: &Schema) -> Filter {
    let cols = schema.leaves(name);
    match cols.as_slice() {
        [] => Filter::MatchNone,
        [col] => column_exists_test(col),
        many => Filter::or(many.iter().map(|c| column_exists_test(c)).collect()),
    }
}

fn lower_or(terms: &[Expr], schema: &Schema) -> CompileResult<Filter> {
    match schema.or_strategy() {
        OrStrategy::MustNotWrapped => {
            // the legacy backend runs should-clauses in parallel; rewrite
            // through De Morgan to keep exit-early semantics
            let negated = terms
                .iter()
                .map(|t| to_filter(&Expr::not(t.clone()).partial_eval(), schema))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(Filter::negate(Filter::and(negated)))
        }
        OrStrategy::Should => {
            let lowered = terms
                .iter()
                .map(|t| to_filter(&t.partial_eval(), schema))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(Filter::or(lowered))
        }
    }
}

fn lower_not(term: &Expr, schema: &Schema) -> CompileResult<Filter> {
    // existence of a variable has its own per-column form; handling it here
    // prevents a rewrite loop between Not(Missing(..)) and Exists(..)
    if let Expr::Missing(inner) = term {
        if let Expr::Variable(name) = inner.as_ref() {
            let cols = schema.leaves(name);
            return Ok(match cols.as_slice() {
                [] => Filter::MatchNone,
                [col] => Filter::exists(col.es_column.clone()),
                many => Filter::or(
                    many.iter()
                        .map(|c| Filter::exists(c.es_column.clone()))
                        .collect(),
                ),
            });
        }
    }
    Ok(Filter::negate(to_filter(term, schema)?))
}

fn lower_eq(lhs: &Expr, rhs: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let (Expr::Variable(name), Expr::Literal(value)) = (lhs, rhs) {
        if let Value::Array(items) = value {
            return lower_eq_list(name, items, lhs, schema);
        }
        return Ok(lower_eq_scalar(name, value, schema));
    }
    // null-aware equality over general operands
    let rewritten = Expr::case(
        vec![
            When::new(lhs.missing(), rhs.missing()),
            When::new(rhs.missing(), Expr::False),
        ],
        Expr::basic_eq(lhs.clone(), rhs.clone()),
    )
    .partial_eval();
    to_filter(&rewritten, schema)
}

fn lower_eq_scalar(name: &str, value: &Value, schema: &Schema) -> Filter {
    for col in schema.leaves(name) {
        let candidate = if col.json_type == JsonType::Boolean {
            value_to_boolean(value)
        } else {
            value.clone()
        };
        if JsonType::of(&candidate).matches(col.json_type) {
            return Filter::term(col.es_column.clone(), candidate);
        }
    }
    Filter::MatchNone
}

fn lower_eq_list(
    name: &str,
    items: &[Value],
    lhs: &Expr,
    schema: &Schema,
) -> CompileResult<Filter> {
    if let [single] = items {
        return Ok(lower_eq_scalar(name, single, schema));
    }

    // split the right-hand values into type-homogeneous groups
    let mut groups: Vec<(JsonType, Vec<Value>)> = Vec::new();
    for item in items {
        let t = JsonType::of(item);
        match groups.iter_mut().find(|(gt, _)| t.matches(*gt)) {
            Some((_, values)) => values.push(item.clone()),
            None => groups.push((t, vec![item.clone()])),
        }
    }

    if let [(group_type, values)] = groups.as_slice() {
        for col in schema.leaves(name) {
            if group_type.matches(col.json_type) {
                return Ok(Filter::terms(col.es_column.clone(), values.clone()));
            }
        }
        return Ok(Filter::MatchNone);
    }

    let branches = groups
        .into_iter()
        .map(|(_, values)| Expr::eq(lhs.clone(), Expr::literal(Value::Array(values))))
        .collect();
    to_filter(&Expr::or(branches).partial_eval(), schema)
}

fn lower_basic_eq(lhs: &Expr, rhs: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let (Expr::Variable(name), Expr::Literal(value)) = (lhs, rhs) {
        let cols = schema.leaves(name);
        let field = cols
            .first()
            .map(|c| c.es_column.clone())
            .unwrap_or_else(|| name.clone());
        return Ok(match value {
            Value::Array(items) => match items.as_slice() {
                [single] => Filter::term(field, single.clone()),
                _ => Filter::terms(field, items.clone()),
            },
            other => Filter::term(field, other.clone()),
        });
    }
    let script = to_es_script(&Expr::basic_eq(lhs.clone(), rhs.clone()), schema)?;
    Ok(Filter::script(script.expr))
}

fn lower_ne(lhs: &Expr, rhs: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let (Expr::Variable(name), Expr::Literal(value)) = (lhs, rhs) {
        let cols = schema.leaves(name);
        return match cols.as_slice() {
            [] => Ok(Filter::MatchAll),
            [col] => Ok(Filter::negate(Filter::term(
                col.es_column.clone(),
                value.clone(),
            ))),
            many => Err(CompileError::AmbiguousSchema {
                field: name.clone(),
                columns: many.len(),
            }),
        };
    }

    let l = to_es_script(&lhs.partial_eval(), schema)?;
    let r = to_es_script(&rhs.partial_eval(), schema)?;
    Ok(match (l.many, r.many) {
        (true, true) => Filter::negate(Filter::script(format!(
            "({}).size()==({}).size() && ({}).containsAll({})",
            l.expr, r.expr, r.expr, l.expr
        ))),
        (true, false) => Filter::negate(Filter::script(format!(
            "({}).contains({})",
            l.expr, r.expr
        ))),
        (false, true) => Filter::negate(Filter::script(format!(
            "({}).contains({})",
            r.expr, l.expr
        ))),
        (false, false) => Filter::script(format!(
            "!{}.equals({})",
            box_value(&l),
            box_value(&r)
        )),
    })
}

fn lower_inequality(
    op: crate::expression::InequalityOp,
    lhs: &Expr,
    rhs: &Expr,
    schema: &Schema,
) -> CompileResult<Filter> {
    if let (Expr::Variable(name), Expr::Literal(value)) = (lhs, rhs) {
        let cols = schema.leaves(name);
        return match cols.as_slice() {
            [col] => Ok(Filter::Range {
                field: col.es_column.clone(),
                bounds: RangeBounds::single(op.as_str(), value.clone()),
            }),
            other => Err(CompileError::AmbiguousSchema {
                field: name.clone(),
                columns: other.len(),
            }),
        };
    }

    let script = to_es_script(&Expr::cmp(op, lhs.clone(), rhs.clone()), schema)?;
    if script.miss != ScriptMiss::Never {
        return Err(CompileError::IndecisiveInequality {
            op: op.as_str().to_string(),
        });
    }
    Ok(Filter::script(script.expr))
}

fn lower_missing(term: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let Expr::Variable(name) = term {
        let cols = schema.leaves(name);
        return Ok(match cols.as_slice() {
            [] => Filter::MatchAll,
            [col] => Filter::missing(col.es_column.clone()),
            many => Filter::and(
                many.iter()
                    .map(|c| Filter::missing(c.es_column.clone()))
                    .collect(),
            ),
        });
    }
    let script = to_es_script(term, schema)?;
    Ok(match script.miss {
        ScriptMiss::Always => Filter::MatchAll,
        ScriptMiss::Never => Filter::MatchNone,
        ScriptMiss::Unknown => Filter::script(format!("({}) == null", script.expr)),
    })
}

fn lower_boolean_cast(term: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let Expr::Variable(name) = term {
        let cols = schema.leaves(name);
        return Ok(match cols.first() {
            Some(col) => Filter::term(col.es_column.clone(), Value::Bool(true)),
            None => Filter::MatchNone,
        });
    }
    let script = to_es_script(&Expr::BooleanCast(Box::new(term.clone())), schema)?;
    Ok(Filter::script(script.expr))
}

/// Strip a string cast: the backend's string tests read the column as-is.
fn unwrap_string_cast(expr: &Expr) -> &Expr {
    match expr {
        Expr::StringCast(inner) => inner,
        other => other,
    }
}

fn lower_prefix(expr: &Expr, prefix: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if matches!(prefix, Expr::Literal(Value::String(p)) if p.is_empty()) {
        return Ok(Filter::MatchAll);
    }
    if matches!(expr, Expr::Null) {
        return Ok(Filter::MatchNone);
    }
    let subject = unwrap_string_cast(expr);
    if let (Expr::Variable(name), Expr::Literal(Value::String(p))) = (subject, prefix) {
        return Ok(match schema.leaves(name).first() {
            Some(col) => Filter::Prefix {
                field: col.es_column.clone(),
                value: p.clone(),
            },
            None => Filter::MatchNone,
        });
    }
    let e = to_es_script(subject, schema)?;
    let p = to_es_script(prefix, schema)?;
    Ok(Filter::script(format!(
        "({}).startsWith({})",
        e.expr, p.expr
    )))
}

fn lower_suffix(expr: &Expr, suffix: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if matches!(suffix, Expr::Literal(Value::String(s)) if s.is_empty()) {
        return Ok(Filter::MatchAll);
    }
    let subject = unwrap_string_cast(expr);
    if let (Expr::Variable(name), Expr::Literal(Value::String(s))) = (subject, suffix) {
        return Ok(match schema.leaves(name).first() {
            Some(col) => Filter::Regexp {
                field: col.es_column.clone(),
                pattern: format!(".*{}", regex::escape(s)),
            },
            None => Filter::MatchNone,
        });
    }
    let e = to_es_script(subject, schema)?;
    let s = to_es_script(suffix, schema)?;
    Ok(Filter::script(format!("({}).endsWith({})", e.expr, s.expr)))
}

fn lower_contains(expr: &Expr, find: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if matches!(find, Expr::Literal(Value::String(f)) if f.is_empty()) {
        return Ok(Filter::MatchAll);
    }
    let subject = unwrap_string_cast(expr);
    if let (Expr::Variable(name), Expr::Literal(Value::String(f))) = (subject, find) {
        return Ok(match schema.leaves(name).first() {
            Some(col) => Filter::Regexp {
                field: col.es_column.clone(),
                pattern: format!(".*{}.*", regex::escape(f)),
            },
            None => Filter::MatchNone,
        });
    }
    let e = to_es_script(subject, schema)?;
    let f = to_es_script(find, schema)?;
    Ok(Filter::script(format!("({}).contains({})", e.expr, f.expr)))
}

fn lower_regexp(expr: &Expr, pattern: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let (Expr::Variable(name), Expr::Literal(Value::String(p))) = (expr, pattern) {
        let cols = schema.leaves(name);
        return match cols.as_slice() {
            [] => Ok(Filter::MatchNone),
            [col] => Ok(Filter::Regexp {
                field: col.es_column.clone(),
                pattern: p.clone(),
            }),
            _ => Err(CompileError::unsupported(format!(
                "regexp over the polymorphic field {}",
                name
            ))),
        };
    }
    Err(CompileError::unsupported(
        "regexp needs a variable subject and a literal pattern",
    ))
}

fn lower_in(value: &Expr, superset: &Expr, schema: &Schema) -> CompileResult<Filter> {
    if let Expr::Variable(name) = value {
        let cols = schema.leaves(name);
        let col = cols.first().ok_or_else(|| {
            CompileError::unsupported(format!("in test over unresolvable field {}", name))
        })?;
        let boolean = col.json_type == JsonType::Boolean;
        if let Expr::Literal(set) = superset {
            return Ok(match set {
                Value::Array(items) => {
                    let values = if boolean {
                        items.iter().map(value_to_boolean).collect()
                    } else {
                        items.clone()
                    };
                    Filter::terms(col.es_column.clone(), values)
                }
                scalar => {
                    let v = if boolean {
                        value_to_boolean(scalar)
                    } else {
                        scalar.clone()
                    };
                    Filter::term(col.es_column.clone(), v)
                }
            });
        }
    }
    if let Expr::Literal(set @ Value::Array(_)) = superset {
        let v = to_es_script(value, schema)?;
        return Ok(Filter::script(format!("{}.contains({})", set, v.expr)));
    }
    Err(CompileError::unsupported("in with a non-literal superset"))
}

fn lower_case(whens: &[When], default: &Expr, schema: &Schema) -> CompileResult<Filter> {
    let case = Expr::case(whens.to_vec(), default.clone());
    if case.data_type(schema) != JsonType::Boolean {
        return Err(CompileError::unsupported("non-boolean case as a filter"));
    }
    let mut branches: Vec<Expr> = whens
        .iter()
        .map(|w| Expr::and(vec![w.when.clone(), w.then.clone()]))
        .collect();
    branches.push(default.clone());
    to_filter(&Expr::or(branches).partial_eval(), schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(OrStrategy::Should)
            .with_column("status", Column::new("status.~s~", JsonType::String))
            .with_column("tags", Column::new("tags.~s~", JsonType::String))
            .with_column("active", Column::new("active.~b~", JsonType::Boolean))
            .with_column("age", Column::new("age.~n~", JsonType::Number))
            .with_column("size", Column::new("size.~n~", JsonType::Number))
            .with_column("size", Column::new("size.~s~", JsonType::String))
    }

    #[test]
    fn test_variable_existence_cardinality() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::var("absent"), &s).unwrap(),
            Filter::MatchNone
        );
        assert_eq!(
            to_filter(&Expr::var("active"), &s).unwrap(),
            Filter::term("active.~b~", json!(true))
        );
        assert_eq!(
            to_filter(&Expr::var("status"), &s).unwrap(),
            Filter::exists("status.~s~")
        );
        assert_eq!(
            to_filter(&Expr::var("size"), &s).unwrap(),
            Filter::or(vec![
                Filter::exists("size.~n~"),
                Filter::exists("size.~s~"),
            ])
        );
    }

    #[test]
    fn test_eq_scalar() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::eq(Expr::var("status"), Expr::literal(json!("open"))), &s).unwrap(),
            Filter::term("status.~s~", json!("open"))
        );
        // no type-matching column: match nothing
        assert_eq!(
            to_filter(&Expr::eq(Expr::var("status"), Expr::literal(json!(3))), &s).unwrap(),
            Filter::MatchNone
        );
        // boolean columns coerce the comparand
        assert_eq!(
            to_filter(&Expr::eq(Expr::var("active"), Expr::literal(json!("T"))), &s).unwrap(),
            Filter::term("active.~b~", json!(true))
        );
    }

    #[test]
    fn test_eq_mixed_type_list() {
        let s = schema();
        let expr = Expr::eq(Expr::var("size"), Expr::literal(json!([1, "a"])));
        assert_eq!(
            to_filter(&expr, &s).unwrap(),
            Filter::or(vec![
                Filter::term("size.~n~", json!(1)),
                Filter::term("size.~s~", json!("a")),
            ])
        );
    }

    #[test]
    fn test_eq_homogeneous_list() {
        let s = schema();
        let expr = Expr::eq(Expr::var("size"), Expr::literal(json!([1, 2])));
        assert_eq!(
            to_filter(&expr, &s).unwrap(),
            Filter::terms("size.~n~", vec![json!(1), json!(2)])
        );
        // a group with no matching column is match-nothing
        let expr = Expr::eq(Expr::var("status"), Expr::literal(json!([1, 2])));
        assert_eq!(to_filter(&expr, &s).unwrap(), Filter::MatchNone);
    }

    #[test]
    fn test_eq_general_operands_rewrite() {
        let s = schema();
        let expr = Expr::eq(Expr::var("status"), Expr::var("tags"));
        let filter = to_filter(&expr, &s).unwrap();
        // rewritten through case/missing; must not error and must not be a leaf term
        assert!(!matches!(filter, Filter::Term { .. }));
    }

    #[test]
    fn test_ne_cardinality() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::ne(Expr::var("absent"), Expr::literal(json!(1))), &s).unwrap(),
            Filter::MatchAll
        );
        assert_eq!(
            to_filter(&Expr::ne(Expr::var("status"), Expr::literal(json!("x"))), &s).unwrap(),
            Filter::negate(Filter::term("status.~s~", json!("x")))
        );
        assert_eq!(
            to_filter(&Expr::ne(Expr::var("size"), Expr::literal(json!(1))), &s),
            Err(CompileError::AmbiguousSchema {
                field: "size".to_string(),
                columns: 2,
            })
        );
    }

    #[test]
    fn test_missing_cardinality() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::missing_of(Expr::var("absent")), &s).unwrap(),
            Filter::MatchAll
        );
        assert_eq!(
            to_filter(&Expr::missing_of(Expr::var("status")), &s).unwrap(),
            Filter::missing("status.~s~")
        );
        assert_eq!(
            to_filter(&Expr::missing_of(Expr::var("size")), &s).unwrap(),
            Filter::and(vec![
                Filter::missing("size.~n~"),
                Filter::missing("size.~s~"),
            ])
        );
    }

    #[test]
    fn test_not_missing_is_exists() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::not(Expr::missing_of(Expr::var("tags"))), &s).unwrap(),
            Filter::exists("tags.~s~")
        );
        assert_eq!(
            to_filter(&Expr::not(Expr::missing_of(Expr::var("absent"))), &s).unwrap(),
            Filter::MatchNone
        );
    }

    #[test]
    fn test_inequality_range() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::gte(Expr::var("age"), Expr::literal(json!(21))), &s).unwrap(),
            Filter::Range {
                field: "age.~n~".to_string(),
                bounds: RangeBounds::single("gte", json!(21)),
            }
        );
        // zero or many columns cannot carry a range
        assert!(matches!(
            to_filter(&Expr::lt(Expr::var("absent"), Expr::literal(json!(1))), &s),
            Err(CompileError::AmbiguousSchema { columns: 0, .. })
        ));
        assert!(matches!(
            to_filter(&Expr::lt(Expr::var("size"), Expr::literal(json!(1))), &s),
            Err(CompileError::AmbiguousSchema { columns: 2, .. })
        ));
    }

    #[test]
    fn test_inequality_must_be_decisive() {
        let s = schema();
        // age may be missing: the script form cannot prove its miss branch false
        let expr = Expr::gt(Expr::var("age"), Expr::Length(Box::new(Expr::var("status"))));
        assert_eq!(
            to_filter(&expr, &s),
            Err(CompileError::IndecisiveInequality {
                op: "gt".to_string(),
            })
        );
    }

    #[test]
    fn test_in_lowering() {
        let s = schema();
        assert_eq!(
            to_filter(
                &Expr::is_in(Expr::var("status"), Expr::literal(json!(["a", "b"]))),
                &s
            )
            .unwrap(),
            Filter::terms("status.~s~", vec![json!("a"), json!("b")])
        );
        assert_eq!(
            to_filter(&Expr::is_in(Expr::var("status"), Expr::literal(json!("a"))), &s).unwrap(),
            Filter::term("status.~s~", json!("a"))
        );
        // boolean columns coerce every member
        assert_eq!(
            to_filter(
                &Expr::is_in(Expr::var("active"), Expr::literal(json!(["T", 0]))),
                &s
            )
            .unwrap(),
            Filter::terms("active.~b~", vec![json!(true), json!(false)])
        );
        assert!(matches!(
            to_filter(&Expr::is_in(Expr::var("absent"), Expr::literal(json!(["a"]))), &s),
            Err(CompileError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_string_tests() {
        let s = schema();
        assert_eq!(
            to_filter(
                &Expr::prefix(Expr::var("status"), Expr::literal(json!("op"))),
                &s
            )
            .unwrap(),
            Filter::Prefix {
                field: "status.~s~".to_string(),
                value: "op".to_string(),
            }
        );
        assert_eq!(
            to_filter(
                &Expr::suffix(Expr::var("status"), Expr::literal(json!("en"))),
                &s
            )
            .unwrap(),
            Filter::Regexp {
                field: "status.~s~".to_string(),
                pattern: ".*en".to_string(),
            }
        );
        // regex metacharacters in the pattern are escaped
        assert_eq!(
            to_filter(
                &Expr::contains(Expr::var("status"), Expr::literal(json!("a.b"))),
                &s
            )
            .unwrap(),
            Filter::Regexp {
                field: "status.~s~".to_string(),
                pattern: ".*a\\.b.*".to_string(),
            }
        );
        assert_eq!(
            to_filter(
                &Expr::prefix(Expr::var("status"), Expr::literal(json!(""))),
                &s
            )
            .unwrap(),
            Filter::MatchAll
        );
    }

    #[test]
    fn test_regexp_lowering() {
        let s = schema();
        assert_eq!(
            to_filter(
                &Expr::regexp(Expr::var("status"), Expr::literal(json!("op.*"))),
                &s
            )
            .unwrap(),
            Filter::Regexp {
                field: "status.~s~".to_string(),
                pattern: "op.*".to_string(),
            }
        );
        assert_eq!(
            to_filter(&Expr::regexp(Expr::var("absent"), Expr::literal(json!("x"))), &s).unwrap(),
            Filter::MatchNone
        );
        assert!(matches!(
            to_filter(&Expr::regexp(Expr::var("size"), Expr::literal(json!("x"))), &s),
            Err(CompileError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_case_lowering() {
        let s = schema();
        let case = Expr::case(
            vec![When::new(
                Expr::missing_of(Expr::var("status")),
                Expr::missing_of(Expr::var("tags")),
            )],
            Expr::False,
        );
        let filter = to_filter(&case, &s).unwrap();
        assert_eq!(
            filter,
            Filter::and(vec![
                Filter::missing("status.~s~"),
                Filter::missing("tags.~s~"),
            ])
        );

        // non-boolean case has no direct filter form
        let case = Expr::case(
            vec![When::new(Expr::var("status"), Expr::literal(json!(1)))],
            Expr::literal(json!(2)),
        );
        assert!(matches!(
            to_filter(&case, &s),
            Err(CompileError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_or_strategies() {
        let a = Expr::eq(Expr::var("status"), Expr::literal(json!("open")));
        let b = Expr::eq(Expr::var("age"), Expr::literal(json!(3)));
        let or = Expr::or(vec![a, b]);

        let native = schema();
        assert_eq!(
            to_filter(&or, &native).unwrap(),
            Filter::or(vec![
                Filter::term("status.~s~", json!("open")),
                Filter::term("age.~n~", json!(3)),
            ])
        );

        let legacy = Schema::new(OrStrategy::MustNotWrapped)
            .with_column("status", Column::new("status.~s~", JsonType::String))
            .with_column("age", Column::new("age.~n~", JsonType::Number));
        assert_eq!(
            to_filter(&or, &legacy).unwrap(),
            Filter::negate(Filter::and(vec![
                Filter::negate(Filter::term("status.~s~", json!("open"))),
                Filter::negate(Filter::term("age.~n~", json!(3))),
            ]))
        );
    }

    #[test]
    fn test_nested_wrapper() {
        let s = schema().with_column(
            "changes.value",
            Column::nested(
                "changes.value.~n~",
                JsonType::Number,
                vec!["changes".to_string()],
            ),
        );
        let inner = Expr::eq(Expr::var("changes.value"), Expr::literal(json!(2)));

        assert_eq!(
            to_filter(&Expr::nested(".", inner.clone()), &s).unwrap(),
            Filter::term("changes.value.~n~", json!(2))
        );
        assert_eq!(
            to_filter(&Expr::nested("changes", inner), &s).unwrap(),
            Filter::nested("changes", Filter::term("changes.value.~n~", json!(2)))
        );
    }

    #[test]
    fn test_unsupported_constructs() {
        let s = schema();
        assert!(matches!(
            to_filter(&Expr::Tuple(vec![Expr::var("a")]), &s),
            Err(CompileError::UnsupportedConstruct { .. })
        ));
        assert!(matches!(
            to_filter(&Expr::Leaves(Box::new(Expr::var("a"))), &s),
            Err(CompileError::UnsupportedConstruct { .. })
        ));
        assert!(matches!(
            to_filter(
                &Expr::Floor {
                    lhs: Box::new(Expr::var("age")),
                    rhs: Box::new(Expr::literal(json!(2))),
                },
                &s
            ),
            Err(CompileError::UnsupportedConstruct { .. })
        ));
    }

    #[test]
    fn test_div_lowers_to_presence_test() {
        let s = Schema::new(OrStrategy::Should)
            .with_column("num", Column::new("num.~n~", JsonType::Number))
            .with_column("den", Column::new("den.~n~", JsonType::Number));
        let div = Expr::Div {
            lhs: Box::new(Expr::var("num")),
            rhs: Box::new(Expr::var("den")),
        };
        // both operands present and a nonzero divisor
        assert_eq!(
            to_filter(&div, &s).unwrap(),
            Filter::negate(Filter::or(vec![
                Filter::missing("num.~n~"),
                Filter::missing("den.~n~"),
                Filter::term("den.~n~", json!(0)),
            ]))
        );
    }

    #[test]
    fn test_string_cast_unwrapped_in_string_tests() {
        let s = schema();
        let subject = Expr::StringCast(Box::new(Expr::var("status")));
        assert_eq!(
            to_filter(
                &Expr::prefix(subject.clone(), Expr::literal(json!("op"))),
                &s
            )
            .unwrap(),
            Filter::Prefix {
                field: "status.~s~".to_string(),
                value: "op".to_string(),
            }
        );
        assert_eq!(
            to_filter(&Expr::suffix(subject.clone(), Expr::literal(json!("en"))), &s).unwrap(),
            Filter::Regexp {
                field: "status.~s~".to_string(),
                pattern: ".*en".to_string(),
            }
        );
        assert_eq!(
            to_filter(&Expr::contains(subject, Expr::literal(json!("pe"))), &s).unwrap(),
            Filter::Regexp {
                field: "status.~s~".to_string(),
                pattern: ".*pe.*".to_string(),
            }
        );
    }

    #[test]
    fn test_script_escape_hatch() {
        let s = schema();
        assert_eq!(
            to_filter(&Expr::Script("doc['x'].value > 1".to_string()), &s).unwrap(),
            Filter::script("doc['x'].value > 1")
        );
    }

    #[test]
    fn test_coalesce_lowering() {
        let s = schema();
        let expr = Expr::Coalesce(vec![Expr::var("status"), Expr::var("tags")]);
        assert_eq!(
            to_filter(&expr, &s).unwrap(),
            Filter::or(vec![
                Filter::exists("status.~s~"),
                Filter::exists("tags.~s~"),
            ])
        );
    }
}
