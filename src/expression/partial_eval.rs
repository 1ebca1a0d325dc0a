//! Partial evaluation of expression trees.
//!
//! Runs before the schema is consulted, so every rule here is purely
//! structural: constant folding, null absorption, and flattening of
//! boolean connectives. The pass is total (never fails) and idempotent,
//! and must not change the truth value of the expression for any document.
//!
//! Null handling in boolean contexts follows the query language's
//! conventions: a null child of a conjunction or a negation coerces to
//! false (so `Not(Null)` folds to `True`), and a prefix test over a null
//! subject folds to `True`.

use serde_json::Value;

use crate::expression::expr::{Expr, When};

impl Expr {
    /// Return an equivalent, simpler expression.
    pub fn partial_eval(&self) -> Expr {
        match self {
            Expr::Variable(_)
            | Expr::Literal(_)
            | Expr::Null
            | Expr::True
            | Expr::False
            | Expr::Script(_) => self.clone(),

            Expr::And(terms) => eval_and(terms),
            Expr::Or(terms) => eval_or(terms),
            Expr::Not(term) => eval_not(term),

            Expr::Eq { lhs, rhs } => eval_eq(lhs, rhs),
            Expr::BasicEq { lhs, rhs } => eval_basic_eq(lhs, rhs),
            Expr::Ne { lhs, rhs } => eval_ne(lhs, rhs),
            Expr::Inequality { op, lhs, rhs } => eval_inequality(*op, lhs, rhs),

            Expr::Missing(term) => eval_missing(term),
            Expr::Exists(term) => eval_exists(term),
            Expr::BooleanCast(term) => eval_boolean_cast(term),
            Expr::StringCast(term) => eval_string_cast(term),
            Expr::Length(term) => eval_length(term),

            Expr::Prefix { expr, prefix } => eval_prefix(expr, prefix),
            Expr::Suffix { expr, suffix } => eval_string_test(expr, suffix, Expr::suffix),
            Expr::Contains { expr, find } => eval_string_test(expr, find, Expr::contains),
            Expr::RegExp { expr, pattern } => {
                Expr::regexp(expr.partial_eval(), pattern.partial_eval())
            }

            Expr::In { value, superset } => eval_in(value, superset),
            Expr::Case { whens, default } => eval_case(whens, default),
            Expr::Coalesce(terms) => eval_coalesce(terms),

            Expr::Tuple(terms) => Expr::Tuple(terms.iter().map(|t| t.partial_eval()).collect()),
            Expr::Leaves(term) => Expr::Leaves(Box::new(term.partial_eval())),
            Expr::NestedQuery { path, query } => Expr::nested(path.clone(), query.partial_eval()),

            Expr::Div { lhs, rhs } => eval_div(lhs, rhs, false),
            Expr::Floor { lhs, rhs } => eval_div(lhs, rhs, true),
        }
    }
}

/// View an expression as a constant JSON value, if it is one.
fn as_literal(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::True => Some(Value::Bool(true)),
        Expr::False => Some(Value::Bool(false)),
        Expr::Null => Some(Value::Null),
        _ => None,
    }
}

/// JSON equality with integer/float unification.
fn literal_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn from_bool(b: bool) -> Expr {
    if b {
        Expr::True
    } else {
        Expr::False
    }
}

fn eval_and(terms: &[Expr]) -> Expr {
    let mut output = Vec::new();
    for term in terms {
        match term.partial_eval() {
            Expr::True => {}
            // a null conjunct coerces to false in boolean context
            Expr::False | Expr::Null => return Expr::False,
            Expr::And(inner) => output.extend(inner),
            other => output.push(other),
        }
    }
    match output.len() {
        0 => Expr::True,
        1 => output.remove(0),
        _ => Expr::And(output),
    }
}

fn eval_or(terms: &[Expr]) -> Expr {
    let mut output = Vec::new();
    for term in terms {
        match term.partial_eval() {
            Expr::True => return Expr::True,
            Expr::False | Expr::Null => {}
            Expr::Or(inner) => output.extend(inner),
            other => output.push(other),
        }
    }
    match output.len() {
        0 => Expr::False,
        1 => output.remove(0),
        _ => Expr::Or(output),
    }
}

fn eval_not(term: &Expr) -> Expr {
    match term.partial_eval() {
        Expr::True => Expr::False,
        Expr::False => Expr::True,
        // boolean coercion of a missing value is false
        Expr::Null => Expr::True,
        Expr::Not(inner) => *inner,
        other => Expr::not(other),
    }
}

fn eval_eq(lhs: &Expr, rhs: &Expr) -> Expr {
    let lhs = lhs.partial_eval();
    let rhs = rhs.partial_eval();
    // equality against null is a missing-value test
    if matches!(rhs, Expr::Null | Expr::Literal(Value::Null)) {
        return lhs.missing().partial_eval();
    }
    if matches!(lhs, Expr::Null | Expr::Literal(Value::Null)) {
        return rhs.missing().partial_eval();
    }
    match (as_literal(&lhs), as_literal(&rhs)) {
        (Some(a), Some(b)) if !a.is_array() && !b.is_array() => from_bool(literal_eq(&a, &b)),
        _ => Expr::eq(lhs, rhs),
    }
}

fn eval_basic_eq(lhs: &Expr, rhs: &Expr) -> Expr {
    let lhs = lhs.partial_eval();
    let rhs = rhs.partial_eval();
    match (as_literal(&lhs), as_literal(&rhs)) {
        (Some(a), Some(b)) if !a.is_array() && !b.is_array() => from_bool(literal_eq(&a, &b)),
        _ => Expr::basic_eq(lhs, rhs),
    }
}

fn eval_ne(lhs: &Expr, rhs: &Expr) -> Expr {
    let lhs = lhs.partial_eval();
    let rhs = rhs.partial_eval();
    match (as_literal(&lhs), as_literal(&rhs)) {
        (Some(a), Some(b)) if !a.is_null() && !b.is_null() => from_bool(!literal_eq(&a, &b)),
        _ => Expr::ne(lhs, rhs),
    }
}

fn eval_inequality(
    op: crate::expression::expr::InequalityOp,
    lhs: &Expr,
    rhs: &Expr,
) -> Expr {
    use crate::expression::expr::InequalityOp::*;
    let lhs = lhs.partial_eval();
    let rhs = rhs.partial_eval();
    if let (Some(a), Some(b)) = (as_literal(&lhs), as_literal(&rhs)) {
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            return from_bool(match op {
                Lt => x < y,
                Lte => x <= y,
                Gt => x > y,
                Gte => x >= y,
            });
        }
    }
    Expr::cmp(op, lhs, rhs)
}

fn eval_missing(term: &Expr) -> Expr {
    match term.partial_eval() {
        Expr::Null | Expr::Literal(Value::Null) => Expr::True,
        Expr::Literal(_) | Expr::True | Expr::False => Expr::False,
        v @ Expr::Variable(_) => Expr::missing_of(v),
        other => other.missing().partial_eval(),
    }
}

fn eval_exists(term: &Expr) -> Expr {
    match term.partial_eval() {
        Expr::Null | Expr::Literal(Value::Null) => Expr::False,
        Expr::Literal(_) | Expr::True | Expr::False => Expr::True,
        other => Expr::not(other.missing()).partial_eval(),
    }
}

fn eval_boolean_cast(term: &Expr) -> Expr {
    match term.partial_eval() {
        Expr::True | Expr::Literal(Value::Bool(true)) => Expr::True,
        Expr::False | Expr::Literal(Value::Bool(false)) => Expr::False,
        Expr::Null | Expr::Literal(Value::Null) => Expr::False,
        other => Expr::BooleanCast(Box::new(other)),
    }
}

fn eval_string_cast(term: &Expr) -> Expr {
    match term.partial_eval() {
        Expr::Null => Expr::Null,
        Expr::Literal(Value::String(s)) => Expr::Literal(Value::String(s)),
        other => Expr::StringCast(Box::new(other)),
    }
}

fn eval_length(term: &Expr) -> Expr {
    match term.partial_eval() {
        Expr::Literal(Value::String(s)) => Expr::Literal(Value::from(s.chars().count() as u64)),
        Expr::Null => Expr::Null,
        other => Expr::Length(Box::new(other)),
    }
}

fn eval_prefix(expr: &Expr, prefix: &Expr) -> Expr {
    let expr = expr.partial_eval();
    let prefix = prefix.partial_eval();
    // prefix-of-null is true, a documented query-language convention
    if matches!(expr, Expr::Null | Expr::Literal(Value::Null)) {
        return Expr::True;
    }
    if matches!(&prefix, Expr::Literal(Value::String(p)) if p.is_empty()) {
        return Expr::True;
    }
    if let (Expr::Literal(Value::String(s)), Expr::Literal(Value::String(p))) = (&expr, &prefix) {
        return from_bool(s.starts_with(p.as_str()));
    }
    Expr::prefix(expr, prefix)
}

/// Shared fold for suffix/contains: empty pattern matches everything,
/// two string literals fold outright.
fn eval_string_test(expr: &Expr, pattern: &Expr, rebuild: fn(Expr, Expr) -> Expr) -> Expr {
    let expr = expr.partial_eval();
    let pattern = pattern.partial_eval();
    if matches!(&pattern, Expr::Literal(Value::String(p)) if p.is_empty()) {
        return Expr::True;
    }
    rebuild(expr, pattern)
}

fn eval_in(value: &Expr, superset: &Expr) -> Expr {
    let value = value.partial_eval();
    let superset = superset.partial_eval();
    if let Expr::Literal(Value::Array(items)) = &superset {
        if items.is_empty() {
            return Expr::False;
        }
        if let Some(v) = as_literal(&value) {
            return from_bool(items.iter().any(|item| literal_eq(item, &v)));
        }
    }
    Expr::is_in(value, superset)
}

fn eval_case(whens: &[When], default: &Expr) -> Expr {
    let mut output = Vec::new();
    for w in whens {
        let guard = w.when.partial_eval();
        match guard {
            Expr::False | Expr::Null => continue,
            Expr::True => {
                // first true guard wins; later alternatives are dead
                let then = w.then.partial_eval();
                if output.is_empty() {
                    return then;
                }
                return Expr::case(output, then);
            }
            _ => output.push(When::new(guard, w.then.partial_eval())),
        }
    }
    if output.is_empty() {
        default.partial_eval()
    } else {
        Expr::case(output, default.partial_eval())
    }
}

fn eval_coalesce(terms: &[Expr]) -> Expr {
    let mut output = Vec::new();
    for term in terms {
        match term.partial_eval() {
            Expr::Null | Expr::Literal(Value::Null) => {}
            constant @ (Expr::Literal(_) | Expr::True | Expr::False) => {
                // a constant always has a value; nothing after it is reachable
                if output.is_empty() {
                    return constant;
                }
                output.push(constant);
                break;
            }
            other => output.push(other),
        }
    }
    match output.len() {
        0 => Expr::Null,
        1 => output.remove(0),
        _ => Expr::Coalesce(output),
    }
}

fn eval_div(lhs: &Expr, rhs: &Expr, floor: bool) -> Expr {
    let lhs = lhs.partial_eval();
    let rhs = rhs.partial_eval();
    if let (Some(a), Some(b)) = (as_literal(&lhs), as_literal(&rhs)) {
        if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
            if y == 0.0 {
                return Expr::Null;
            }
            let q = if floor { (x / y).floor() } else { x / y };
            return Expr::Literal(Value::from(q));
        }
    }
    if floor {
        Expr::Floor {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    } else {
        Expr::Div {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}
