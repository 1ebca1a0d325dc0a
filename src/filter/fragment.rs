//! Filter fragment model and wire serialization.

use serde_json::{json, Map, Value};

/// Bounds of a range test. Unset keys are unconstrained.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeBounds {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

impl RangeBounds {
    /// A single bound keyed by its backend range key.
    pub fn single(op: &str, value: Value) -> RangeBounds {
        let mut bounds = RangeBounds::default();
        match op {
            "gt" => bounds.gt = Some(value),
            "gte" => bounds.gte = Some(value),
            "lt" => bounds.lt = Some(value),
            "lte" => bounds.lte = Some(value),
            _ => {}
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }

    /// Intersect with another set of bounds. Where both sides constrain the
    /// same key, the stricter bound wins when the values are numerically
    /// comparable, otherwise the existing bound is kept.
    pub fn intersect(&self, other: &RangeBounds) -> RangeBounds {
        fn pick(
            a: &Option<Value>,
            b: &Option<Value>,
            stricter: fn(f64, f64) -> bool,
        ) -> Option<Value> {
            match (a, b) {
                (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
                    (Some(xv), Some(yv)) if stricter(yv, xv) => Some(y.clone()),
                    _ => Some(x.clone()),
                },
                (Some(x), None) => Some(x.clone()),
                (None, Some(y)) => Some(y.clone()),
                (None, None) => None,
            }
        }
        RangeBounds {
            gt: pick(&self.gt, &other.gt, |b, a| b > a),
            gte: pick(&self.gte, &other.gte, |b, a| b > a),
            lt: pick(&self.lt, &other.lt, |b, a| b < a),
            lte: pick(&self.lte, &other.lte, |b, a| b < a),
        }
    }

    fn to_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(v) = &self.gt {
            out.insert("gt".to_string(), v.clone());
        }
        if let Some(v) = &self.gte {
            out.insert("gte".to_string(), v.clone());
        }
        if let Some(v) = &self.lt {
            out.insert("lt".to_string(), v.clone());
        }
        if let Some(v) = &self.lte {
            out.insert("lte".to_string(), v.clone());
        }
        Value::Object(out)
    }
}

/// A backend filter fragment: a leaf test, a boolean combinator over
/// sub-fragments, or an opaque script.
///
/// Fragments are transient values built per compilation, never mutated in
/// place. Structural equality is the identity the normalizer's fixpoint
/// test relies on.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Universal fragment: matches every document
    MatchAll,
    /// Universal fragment: matches no document
    MatchNone,

    /// Exact value test on one physical column
    Term { field: String, value: Value },
    /// Membership test on one physical column
    Terms { field: String, values: Vec<Value> },
    /// Ordering test on one physical column
    Range { field: String, bounds: RangeBounds },
    /// String prefix test
    Prefix { field: String, value: String },
    /// Regular-expression test
    Regexp { field: String, pattern: String },
    /// Field-has-a-value test
    Exists { field: String },

    /// All sub-filters must match
    And(Vec<Filter>),
    /// At least one sub-filter must match
    Or(Vec<Filter>),
    /// Sub-filter must not match
    Not(Box<Filter>),

    /// Filter scoped to a nested-document path
    Nested { path: String, query: Box<Filter> },

    /// Opaque embedded-script test
    Script { source: String },
}

impl Filter {
    pub fn term(field: impl Into<String>, value: Value) -> Filter {
        Filter::Term {
            field: field.into(),
            value,
        }
    }

    pub fn terms(field: impl Into<String>, values: Vec<Value>) -> Filter {
        Filter::Terms {
            field: field.into(),
            values,
        }
    }

    pub fn exists(field: impl Into<String>) -> Filter {
        Filter::Exists {
            field: field.into(),
        }
    }

    /// Field-has-no-value test
    pub fn missing(field: impl Into<String>) -> Filter {
        Filter::Not(Box::new(Filter::exists(field)))
    }

    pub fn and(filters: Vec<Filter>) -> Filter {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Filter {
        Filter::Or(filters)
    }

    pub fn negate(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    pub fn script(source: impl Into<String>) -> Filter {
        Filter::Script {
            source: source.into(),
        }
    }

    pub fn nested(path: impl Into<String>, query: Filter) -> Filter {
        Filter::Nested {
            path: path.into(),
            query: Box::new(query),
        }
    }

    /// Number of nodes in this fragment, used to bound normalization.
    pub fn node_count(&self) -> usize {
        match self {
            Filter::MatchAll
            | Filter::MatchNone
            | Filter::Term { .. }
            | Filter::Terms { .. }
            | Filter::Range { .. }
            | Filter::Prefix { .. }
            | Filter::Regexp { .. }
            | Filter::Exists { .. }
            | Filter::Script { .. } => 1,
            Filter::And(subs) | Filter::Or(subs) => {
                1 + subs.iter().map(Filter::node_count).sum::<usize>()
            }
            Filter::Not(sub) => 1 + sub.node_count(),
            Filter::Nested { query, .. } => 1 + query.node_count(),
        }
    }

    /// Serialize to the backend's filter DSL wire form.
    pub fn to_es_json(&self) -> Value {
        // object with one non-literal key, which json! cannot express
        fn keyed(key: &str, value: Value) -> Value {
            let mut out = Map::new();
            out.insert(key.to_string(), value);
            Value::Object(out)
        }

        match self {
            Filter::MatchAll => json!({"match_all": {}}),
            Filter::MatchNone => json!({"bool": {"must_not": {"match_all": {}}}}),
            Filter::Term { field, value } => json!({"term": keyed(field, value.clone())}),
            Filter::Terms { field, values } => {
                json!({"terms": keyed(field, Value::Array(values.clone()))})
            }
            Filter::Range { field, bounds } => json!({"range": keyed(field, bounds.to_json())}),
            Filter::Prefix { field, value } => {
                json!({"prefix": keyed(field, Value::String(value.clone()))})
            }
            Filter::Regexp { field, pattern } => {
                json!({"regexp": keyed(field, Value::String(pattern.clone()))})
            }
            Filter::Exists { field } => json!({"exists": {"field": field.clone()}}),
            Filter::And(subs) => {
                json!({"bool": {"filter": subs.iter().map(Filter::to_es_json).collect::<Vec<_>>()}})
            }
            Filter::Or(subs) => {
                json!({"bool": {"should": subs.iter().map(Filter::to_es_json).collect::<Vec<_>>()}})
            }
            Filter::Not(sub) => json!({"bool": {"must_not": sub.to_es_json()}}),
            Filter::Nested { path, query } => {
                json!({"nested": {"path": path.clone(), "query": query.to_es_json()}})
            }
            Filter::Script { source } => {
                json!({"script": {"script": {"lang": "painless", "source": source.clone()}}})
            }
        }
    }
}
