//! Embedded-script fallback for expressions with no structural lowering.

use serde_json::Value;

use crate::error::{CompileError, CompileResult};
use crate::expression::Expr;
use crate::schema::{JsonType, Schema};

/// Whether a script expression can evaluate to "no value".
///
/// Inequalities must be decisive: a script whose miss branch is not
/// provably `Never` is rejected rather than silently three-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMiss {
    Never,
    Always,
    Unknown,
}

impl ScriptMiss {
    fn combine(self, other: ScriptMiss) -> ScriptMiss {
        match (self, other) {
            (ScriptMiss::Never, ScriptMiss::Never) => ScriptMiss::Never,
            (ScriptMiss::Always, _) | (_, ScriptMiss::Always) => ScriptMiss::Always,
            _ => ScriptMiss::Unknown,
        }
    }
}

/// A typed textual script expression.
#[derive(Debug, Clone, PartialEq)]
pub struct EsScript {
    pub json_type: JsonType,
    pub expr: String,
    /// True when the expression yields a list of values
    pub many: bool,
    pub miss: ScriptMiss,
}

impl EsScript {
    fn new(json_type: JsonType, expr: impl Into<String>, miss: ScriptMiss) -> Self {
        Self {
            json_type,
            expr: expr.into(),
            many: false,
            miss,
        }
    }
}

/// Short type tag for a script accessor name.
fn type_tag(json_type: JsonType) -> Option<&'static str> {
    match json_type {
        JsonType::String => Some("s"),
        JsonType::Boolean => Some("b"),
        JsonType::Integer | JsonType::Number => Some("n"),
        _ => None,
    }
}

/// Script accessor name for one typed realization of a logical field, so
/// generated scripts can tell same-named polymorphic columns apart.
pub fn script_accessor(logical_name: &str, json_type: JsonType) -> String {
    match type_tag(json_type) {
        Some(tag) => format!("{}.${}", logical_name, tag),
        None => logical_name.to_string(),
    }
}

/// Parse the type tag back off an accessor name. Untagged or unknown
/// names map to the default tag `j`.
pub fn script_type(var_name: &str) -> &'static str {
    match var_name.rsplit_once(".$") {
        Some((_, "s")) => "s",
        Some((_, "b")) => "b",
        Some((_, "n")) => "n",
        _ => "j",
    }
}

/// Box a script value according to its declared type so runtime
/// comparisons behave consistently regardless of native inference.
pub fn box_value(script: &EsScript) -> String {
    match script.json_type {
        JsonType::Boolean => format!("Boolean.valueOf({})", script.expr),
        JsonType::Integer => format!("Integer.valueOf({})", script.expr),
        JsonType::Number => format!("Double.valueOf({})", script.expr),
        _ => script.expr.clone(),
    }
}

/// Translate an expression into a script expression. Supports the subset
/// of variants the fallback lowering paths need; anything else is an
/// unsupported construct.
pub fn to_es_script(expr: &Expr, schema: &Schema) -> CompileResult<EsScript> {
    match expr {
        Expr::Null => Ok(EsScript::new(JsonType::Null, "null", ScriptMiss::Always)),
        Expr::True => Ok(EsScript::new(JsonType::Boolean, "true", ScriptMiss::Never)),
        Expr::False => Ok(EsScript::new(JsonType::Boolean, "false", ScriptMiss::Never)),

        Expr::Literal(value) => literal_script(value),
        Expr::Variable(name) => variable_script(name, schema),

        Expr::StringCast(term) => {
            let s = to_es_script(term, schema)?;
            Ok(EsScript {
                json_type: JsonType::String,
                expr: format!("String.valueOf({})", s.expr),
                many: s.many,
                miss: s.miss,
            })
        }

        Expr::Length(term) => {
            let s = to_es_script(term, schema)?;
            Ok(EsScript {
                json_type: JsonType::Integer,
                expr: format!("({}).length()", s.expr),
                many: false,
                miss: s.miss,
            })
        }

        Expr::BooleanCast(term) => {
            let s = to_es_script(term, schema)?;
            Ok(EsScript {
                json_type: JsonType::Boolean,
                expr: box_value(&EsScript {
                    json_type: JsonType::Boolean,
                    ..s.clone()
                }),
                many: false,
                miss: ScriptMiss::Never,
            })
        }

        Expr::Div { lhs, rhs } => {
            let l = to_es_script(lhs, schema)?;
            let r = to_es_script(rhs, schema)?;
            Ok(EsScript {
                json_type: JsonType::Number,
                expr: format!("({}) / ({})", l.expr, r.expr),
                many: false,
                miss: l.miss.combine(r.miss).combine(ScriptMiss::Unknown),
            })
        }

        Expr::Floor { lhs, rhs } => {
            let l = to_es_script(lhs, schema)?;
            let r = to_es_script(rhs, schema)?;
            Ok(EsScript {
                json_type: JsonType::Number,
                expr: format!("Math.floor(({}) / ({}))", l.expr, r.expr),
                many: false,
                miss: l.miss.combine(r.miss).combine(ScriptMiss::Unknown),
            })
        }

        Expr::BasicEq { lhs, rhs } => {
            let l = to_es_script(lhs, schema)?;
            let r = to_es_script(rhs, schema)?;
            let miss = l.miss.combine(r.miss);
            Ok(EsScript {
                json_type: JsonType::Boolean,
                expr: format!("{}.equals({})", box_value(&l), box_value(&r)),
                many: false,
                miss,
            })
        }

        Expr::Inequality { op, lhs, rhs } => {
            let l = to_es_script(lhs, schema)?;
            let r = to_es_script(rhs, schema)?;
            let miss = l.miss.combine(r.miss);
            Ok(EsScript {
                json_type: JsonType::Boolean,
                expr: format!("({}) {} ({})", l.expr, op.symbol(), r.expr),
                many: false,
                miss,
            })
        }

        Expr::Script(source) => Ok(EsScript::new(
            JsonType::Object,
            source.clone(),
            ScriptMiss::Never,
        )),

        other => Err(CompileError::unsupported(format!(
            "script form of {}",
            construct_name(other)
        ))),
    }
}

/// Human-readable name of an expression variant for error messages.
pub(crate) fn construct_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Variable(_) => "variable",
        Expr::Literal(_) => "literal",
        Expr::Null => "null",
        Expr::True => "true",
        Expr::False => "false",
        Expr::And(_) => "and",
        Expr::Or(_) => "or",
        Expr::Not(_) => "not",
        Expr::Eq { .. } => "eq",
        Expr::BasicEq { .. } => "basic eq",
        Expr::Ne { .. } => "ne",
        Expr::Inequality { .. } => "inequality",
        Expr::Missing(_) => "missing",
        Expr::Exists(_) => "exists",
        Expr::BooleanCast(_) => "boolean cast",
        Expr::StringCast(_) => "string cast",
        Expr::Length(_) => "length",
        Expr::Prefix { .. } => "prefix",
        Expr::Suffix { .. } => "suffix",
        Expr::Contains { .. } => "contains",
        Expr::RegExp { .. } => "regexp",
        Expr::In { .. } => "in",
        Expr::Case { .. } => "case",
        Expr::Coalesce(_) => "coalesce",
        Expr::Tuple(_) => "tuple",
        Expr::Leaves(_) => "leaves",
        Expr::NestedQuery { .. } => "nested query",
        Expr::Script(_) => "script",
        Expr::Div { .. } => "div",
        Expr::Floor { .. } => "floor",
    }
}

fn literal_script(value: &Value) -> CompileResult<EsScript> {
    let rendered = match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    };
    Ok(EsScript {
        json_type: JsonType::of(value),
        expr: rendered,
        many: value.is_array(),
        miss: if value.is_null() {
            ScriptMiss::Always
        } else {
            ScriptMiss::Never
        },
    })
}

/// Script read of a logical field. A polymorphic field is read through the
/// tagged accessor of its first typed realization only; the generated
/// script does not consult the field's other columns.
fn variable_script(name: &str, schema: &Schema) -> CompileResult<EsScript> {
    let cols = schema.leaves(name);
    match cols.as_slice() {
        [] => Ok(EsScript::new(JsonType::Null, "null", ScriptMiss::Always)),
        [col] => Ok(EsScript {
            json_type: col.json_type,
            expr: format!("doc['{}'].value", col.es_column),
            many: false,
            miss: ScriptMiss::Unknown,
        }),
        [first, ..] => {
            // polymorphic field: address one typed realization through its
            // tagged accessor so same-named columns stay distinguishable
            let accessor = script_accessor(name, first.json_type);
            Ok(EsScript {
                json_type: first.json_type,
                expr: format!("doc['{}'].value", accessor),
                many: false,
                miss: ScriptMiss::Unknown,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, OrStrategy};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(OrStrategy::Should)
            .with_column("age", Column::new("age.~n~", JsonType::Number))
            .with_column("size", Column::new("size.~n~", JsonType::Number))
            .with_column("size", Column::new("size.~s~", JsonType::String))
    }

    #[test]
    fn test_box_value() {
        let b = EsScript::new(JsonType::Boolean, "x", ScriptMiss::Never);
        assert_eq!(box_value(&b), "Boolean.valueOf(x)");
        let i = EsScript::new(JsonType::Integer, "x", ScriptMiss::Never);
        assert_eq!(box_value(&i), "Integer.valueOf(x)");
        let n = EsScript::new(JsonType::Number, "x", ScriptMiss::Never);
        assert_eq!(box_value(&n), "Double.valueOf(x)");
        let s = EsScript::new(JsonType::String, "x", ScriptMiss::Never);
        assert_eq!(box_value(&s), "x");
    }

    #[test]
    fn test_accessor_round_trip() {
        assert_eq!(script_accessor("size", JsonType::String), "size.$s");
        assert_eq!(script_accessor("size", JsonType::Number), "size.$n");
        assert_eq!(script_accessor("flag", JsonType::Boolean), "flag.$b");
        assert_eq!(script_type("size.$s"), "s");
        assert_eq!(script_type("size.$n"), "n");
        assert_eq!(script_type("flag.$b"), "b");
        assert_eq!(script_type("plain"), "j");
        assert_eq!(script_type("odd.$z"), "j");
    }

    #[test]
    fn test_variable_script() {
        let s = to_es_script(&Expr::var("age"), &schema()).unwrap();
        assert_eq!(s.expr, "doc['age.~n~'].value");
        assert_eq!(s.miss, ScriptMiss::Unknown);

        let absent = to_es_script(&Expr::var("absent"), &schema()).unwrap();
        assert_eq!(absent.miss, ScriptMiss::Always);

        // polymorphic fields go through tagged accessors
        let poly = to_es_script(&Expr::var("size"), &schema()).unwrap();
        assert_eq!(poly.expr, "doc['size.$n'].value");
    }

    #[test]
    fn test_inequality_script_miss() {
        let cmp = Expr::gt(Expr::var("age"), Expr::literal(json!(10)));
        let s = to_es_script(&cmp, &schema()).unwrap();
        assert_eq!(s.expr, "(doc['age.~n~'].value) > (10)");
        assert_eq!(s.miss, ScriptMiss::Unknown);

        let cmp = Expr::gt(Expr::literal(json!(3)), Expr::literal(json!(10)));
        let s = to_es_script(&cmp, &schema()).unwrap();
        assert_eq!(s.miss, ScriptMiss::Never);
    }

    #[test]
    fn test_literal_script() {
        let s = to_es_script(&Expr::literal(json!("open")), &schema()).unwrap();
        assert_eq!(s.expr, "\"open\"");
        assert!(!s.many);

        let s = to_es_script(&Expr::literal(json!([1, 2])), &schema()).unwrap();
        assert!(s.many);
    }
}
