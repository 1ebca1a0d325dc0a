//! Decomposition of conjunctions across nested-document scopes.
//!
//! The backend cannot evaluate one filter across nested scopes, so a
//! predicate touching several scopes is split into one sub-expression per
//! scope before lowering. Only top-level conjunctions decompose; any other
//! shape whose fields span buckets is a hard error, not an approximation.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CompileError, CompileResult};
use crate::expression::Expr;
use crate::lower::script::construct_name;
use crate::schema::Schema;

/// Split an expression into per-depth buckets, shallowest first.
///
/// A sub-expression whose fields all share one nesting depth is kept whole
/// at that depth; expressions with no field references land at depth 0.
pub fn split_by_depth(expr: &Expr, schema: &Schema) -> CompileResult<Vec<Vec<Expr>>> {
    let mut buckets: Vec<Vec<Expr>> = Vec::new();
    route_by_depth(expr, schema, &mut buckets)?;
    Ok(buckets)
}

fn route_by_depth(
    expr: &Expr,
    schema: &Schema,
    buckets: &mut Vec<Vec<Expr>>,
) -> CompileResult<()> {
    let depths: BTreeSet<usize> = expr.vars().iter().map(|v| schema.depth_of(v)).collect();
    match depths.len() {
        0 => {
            place_at_depth(buckets, 0, expr.clone());
            Ok(())
        }
        1 => {
            let depth = depths.into_iter().next().unwrap_or(0);
            place_at_depth(buckets, depth, expr.clone());
            Ok(())
        }
        _ => match expr {
            Expr::And(terms) => {
                for term in terms {
                    route_by_depth(term, schema, buckets)?;
                }
                Ok(())
            }
            other => Err(CompileError::NonDecomposableExpression {
                construct: construct_name(other).to_string(),
            }),
        },
    }
}

fn place_at_depth(buckets: &mut Vec<Vec<Expr>>, depth: usize, expr: Expr) {
    if buckets.len() <= depth {
        buckets.resize_with(depth + 1, Vec::new);
    }
    buckets[depth].push(expr);
}

/// Split an expression into per-scope buckets keyed by nested-path
/// identifier, `"."` for the root scope.
///
/// Surviving sub-expressions have their field references rewritten from
/// logical names to resolved physical column names; polymorphic names are
/// left logical so the per-column lowering rules still see every typed
/// realization.
pub fn split_by_path(
    expr: &Expr,
    schema: &Schema,
) -> CompileResult<BTreeMap<String, Vec<Expr>>> {
    let mut buckets: BTreeMap<String, Vec<Expr>> = BTreeMap::new();
    route_by_path(expr, schema, &mut buckets)?;
    Ok(buckets)
}

fn route_by_path(
    expr: &Expr,
    schema: &Schema,
    buckets: &mut BTreeMap<String, Vec<Expr>>,
) -> CompileResult<()> {
    let vars = expr.vars();
    let paths: BTreeSet<String> = vars.iter().map(|v| var_path(v, schema)).collect();
    match paths.len() {
        0 => {
            buckets.entry(".".to_string()).or_default().push(expr.clone());
            Ok(())
        }
        1 => {
            let path = paths.into_iter().next().unwrap_or_else(|| ".".to_string());
            let renames: BTreeMap<String, String> = vars
                .iter()
                .filter_map(|v| match schema.leaves(v).as_slice() {
                    [only] => Some((v.clone(), only.es_column.clone())),
                    _ => None,
                })
                .collect();
            buckets.entry(path).or_default().push(expr.map(&renames));
            Ok(())
        }
        _ => match expr {
            Expr::And(terms) => {
                for term in terms {
                    route_by_path(term, schema, buckets)?;
                }
                Ok(())
            }
            other => Err(CompileError::NonDecomposableExpression {
                construct: construct_name(other).to_string(),
            }),
        },
    }
}

/// Scope identifier of a logical field, `"."` when it does not resolve.
fn var_path(name: &str, schema: &Schema) -> String {
    schema
        .leaves(name)
        .first()
        .map(|c| c.query_path().to_string())
        .unwrap_or_else(|| ".".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, JsonType, OrStrategy};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(OrStrategy::Should)
            .with_column("a", Column::new("a.~n~", JsonType::Number))
            .with_column(
                "b.c",
                Column::nested("b.c.~n~", JsonType::Number, vec!["b".to_string()]),
            )
            .with_column("size", Column::new("size.~n~", JsonType::Number))
            .with_column("size", Column::new("size.~s~", JsonType::String))
    }

    #[test]
    fn test_depth_split() {
        let expr = Expr::and(vec![
            Expr::eq(Expr::var("a"), Expr::literal(json!(1))),
            Expr::eq(Expr::var("b.c"), Expr::literal(json!(2))),
        ]);
        let buckets = split_by_depth(&expr, &schema()).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(
            buckets[0],
            vec![Expr::eq(Expr::var("a"), Expr::literal(json!(1)))]
        );
        assert_eq!(
            buckets[1],
            vec![Expr::eq(Expr::var("b.c"), Expr::literal(json!(2)))]
        );
    }

    #[test]
    fn test_single_depth_kept_whole() {
        let expr = Expr::or(vec![
            Expr::eq(Expr::var("a"), Expr::literal(json!(1))),
            Expr::missing_of(Expr::var("a")),
        ]);
        let buckets = split_by_depth(&expr, &schema()).unwrap();
        assert_eq!(buckets, vec![vec![expr]]);
    }

    #[test]
    fn test_non_conjunction_across_depths_fails() {
        let expr = Expr::or(vec![
            Expr::eq(Expr::var("a"), Expr::literal(json!(1))),
            Expr::eq(Expr::var("b.c"), Expr::literal(json!(2))),
        ]);
        assert_eq!(
            split_by_depth(&expr, &schema()),
            Err(CompileError::NonDecomposableExpression {
                construct: "or".to_string(),
            })
        );
        assert!(matches!(
            split_by_path(&expr, &schema()),
            Err(CompileError::NonDecomposableExpression { .. })
        ));
    }

    #[test]
    fn test_path_split_renames_to_physical_columns() {
        let expr = Expr::and(vec![
            Expr::eq(Expr::var("a"), Expr::literal(json!(1))),
            Expr::eq(Expr::var("b.c"), Expr::literal(json!(2))),
        ]);
        let buckets = split_by_path(&expr, &schema()).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(
            buckets["."],
            vec![Expr::eq(Expr::var("a.~n~"), Expr::literal(json!(1)))]
        );
        assert_eq!(
            buckets["b"],
            vec![Expr::eq(Expr::var("b.c.~n~"), Expr::literal(json!(2)))]
        );
    }

    #[test]
    fn test_polymorphic_names_stay_logical() {
        let expr = Expr::eq(Expr::var("size"), Expr::literal(json!(1)));
        let buckets = split_by_path(&expr, &schema()).unwrap();
        assert_eq!(buckets["."], vec![expr]);
    }

    #[test]
    fn test_zero_variable_expression_routes_to_root() {
        let buckets = split_by_path(&Expr::True, &schema()).unwrap();
        assert_eq!(buckets["."], vec![Expr::True]);

        let buckets = split_by_depth(&Expr::True, &schema()).unwrap();
        assert_eq!(buckets, vec![vec![Expr::True]]);
    }

    #[test]
    fn test_nested_conjunction_recurses() {
        let expr = Expr::and(vec![
            Expr::and(vec![
                Expr::eq(Expr::var("a"), Expr::literal(json!(1))),
                Expr::eq(Expr::var("b.c"), Expr::literal(json!(2))),
            ]),
            Expr::missing_of(Expr::var("a")),
        ]);
        let buckets = split_by_depth(&expr, &schema()).unwrap();
        assert_eq!(buckets[0].len(), 2);
        assert_eq!(buckets[1].len(), 1);
    }
}
