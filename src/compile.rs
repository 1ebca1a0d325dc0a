//! End-to-end compilation pipeline.

use log::debug;

use crate::error::CompileResult;
use crate::expression::Expr;
use crate::filter::{normalize, Filter};
use crate::lower::to_filter;
use crate::schema::Schema;
use crate::split::split_by_path;

/// Compile an expression into a normalized backend filter fragment.
///
/// Pipeline: partial evaluation, scope decomposition, per-scope lowering,
/// nested wrapping for non-root scopes, conjunction across scopes, then
/// normalization. Any stage failing fails the whole compile with no
/// partial output.
pub fn compile(expr: &Expr, schema: &Schema) -> CompileResult<Filter> {
    let evaluated = expr.partial_eval();
    let buckets = split_by_path(&evaluated, schema)?;
    debug!("compiling across {} scope(s)", buckets.len());

    let mut scopes = Vec::new();
    for (path, mut terms) in buckets {
        let conjunction = if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        };
        let lowered = to_filter(&conjunction.partial_eval(), schema)?;
        // lowering a nested wrapper already scopes the fragment; wrapping it
        // again would nest the same path inside itself
        let already_scoped =
            matches!(&lowered, Filter::Nested { path: p, .. } if *p == path);
        scopes.push(if path == "." || already_scoped {
            lowered
        } else {
            Filter::nested(path, lowered)
        });
    }

    let combined = match scopes.len() {
        0 => Filter::MatchAll,
        1 => scopes.remove(0),
        _ => Filter::and(scopes),
    };
    Ok(normalize(&combined))
}
