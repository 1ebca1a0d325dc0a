//! Expression AST definitions.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::schema::{JsonType, Schema};

/// Inequality operators, named after their backend range keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InequalityOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl InequalityOp {
    /// Range-clause key in the backend filter DSL
    pub fn as_str(&self) -> &'static str {
        match self {
            InequalityOp::Lt => "lt",
            InequalityOp::Lte => "lte",
            InequalityOp::Gt => "gt",
            InequalityOp::Gte => "gte",
        }
    }

    /// Script comparison operator
    pub fn symbol(&self) -> &'static str {
        match self {
            InequalityOp::Lt => "<",
            InequalityOp::Lte => "<=",
            InequalityOp::Gt => ">",
            InequalityOp::Gte => ">=",
        }
    }
}

/// One guarded alternative of a `Case` expression
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub when: Expr,
    pub then: Expr,
}

impl When {
    pub fn new(when: Expr, then: Expr) -> Self {
        Self { when, then }
    }
}

/// Expression tree node.
///
/// Immutable: every transform returns a new tree. The set of variants is
/// closed so that each lowering and evaluation site is forced to stay
/// exhaustive when a variant is added.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical field reference
    Variable(String),

    /// Constant JSON value
    Literal(Value),

    /// Null singleton (a missing value, distinct from `False`)
    Null,
    /// True singleton
    True,
    /// False singleton
    False,

    /// Conjunction over any number of terms
    And(Vec<Expr>),
    /// Disjunction over any number of terms
    Or(Vec<Expr>),
    /// Negation
    Not(Box<Expr>),

    /// Null-aware equality
    Eq { lhs: Box<Expr>, rhs: Box<Expr> },
    /// Strict equality over values known to exist
    BasicEq { lhs: Box<Expr>, rhs: Box<Expr> },
    /// Null-aware inequality
    Ne { lhs: Box<Expr>, rhs: Box<Expr> },

    /// Ordering comparison (lt/lte/gt/gte)
    Inequality {
        op: InequalityOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// True when the operand has no value
    Missing(Box<Expr>),
    /// True when the operand has a value
    Exists(Box<Expr>),
    /// Coerce the operand to a boolean
    BooleanCast(Box<Expr>),
    /// Coerce the operand to a string
    StringCast(Box<Expr>),
    /// String length
    Length(Box<Expr>),

    /// String starts with `prefix`
    Prefix { expr: Box<Expr>, prefix: Box<Expr> },
    /// String ends with `suffix`
    Suffix { expr: Box<Expr>, suffix: Box<Expr> },
    /// String contains `find`
    Contains { expr: Box<Expr>, find: Box<Expr> },
    /// String matches a regular expression
    RegExp { expr: Box<Expr>, pattern: Box<Expr> },

    /// Set membership: `value` is one of `superset`
    In {
        value: Box<Expr>,
        superset: Box<Expr>,
    },

    /// Ordered guarded alternatives with a default
    Case { whens: Vec<When>, default: Box<Expr> },
    /// First non-null of the terms
    Coalesce(Vec<Expr>),

    /// Fixed-arity grouping; has no direct filter form
    Tuple(Vec<Expr>),
    /// Object field enumeration; has no direct filter form
    Leaves(Box<Expr>),

    /// Predicate scoped to a nested-document path
    NestedQuery { path: String, query: Box<Expr> },

    /// Opaque backend-script escape hatch
    Script(String),

    /// Division, used inside missing-value logic
    Div { lhs: Box<Expr>, rhs: Box<Expr> },
    /// Floor division, used inside missing-value logic
    Floor { lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    /// Create a variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    /// Create a literal expression
    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    /// Create a conjunction
    pub fn and(terms: Vec<Expr>) -> Self {
        Expr::And(terms)
    }

    /// Create a disjunction
    pub fn or(terms: Vec<Expr>) -> Self {
        Expr::Or(terms)
    }

    /// Create a negation
    pub fn not(term: Expr) -> Self {
        Expr::Not(Box::new(term))
    }

    /// Create a null-aware equality
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::Eq {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Create a strict equality
    pub fn basic_eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::BasicEq {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Create a null-aware inequality
    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Expr::Ne {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Create an ordering comparison
    pub fn cmp(op: InequalityOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Inequality {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Self::cmp(InequalityOp::Lt, lhs, rhs)
    }

    pub fn lte(lhs: Expr, rhs: Expr) -> Self {
        Self::cmp(InequalityOp::Lte, lhs, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Self::cmp(InequalityOp::Gt, lhs, rhs)
    }

    pub fn gte(lhs: Expr, rhs: Expr) -> Self {
        Self::cmp(InequalityOp::Gte, lhs, rhs)
    }

    /// Create a missing-value test
    pub fn missing_of(operand: Expr) -> Self {
        Expr::Missing(Box::new(operand))
    }

    /// Create an existence test
    pub fn exists(operand: Expr) -> Self {
        Expr::Exists(Box::new(operand))
    }

    /// Create a prefix test
    pub fn prefix(expr: Expr, prefix: Expr) -> Self {
        Expr::Prefix {
            expr: Box::new(expr),
            prefix: Box::new(prefix),
        }
    }

    /// Create a suffix test
    pub fn suffix(expr: Expr, suffix: Expr) -> Self {
        Expr::Suffix {
            expr: Box::new(expr),
            suffix: Box::new(suffix),
        }
    }

    /// Create a contains test
    pub fn contains(expr: Expr, find: Expr) -> Self {
        Expr::Contains {
            expr: Box::new(expr),
            find: Box::new(find),
        }
    }

    /// Create a regular-expression test
    pub fn regexp(expr: Expr, pattern: Expr) -> Self {
        Expr::RegExp {
            expr: Box::new(expr),
            pattern: Box::new(pattern),
        }
    }

    /// Create a set-membership test
    pub fn is_in(value: Expr, superset: Expr) -> Self {
        Expr::In {
            value: Box::new(value),
            superset: Box::new(superset),
        }
    }

    /// Create a case expression
    pub fn case(whens: Vec<When>, default: Expr) -> Self {
        Expr::Case {
            whens,
            default: Box::new(default),
        }
    }

    /// Create a nested-scope wrapper
    pub fn nested(path: impl Into<String>, query: Expr) -> Self {
        Expr::NestedQuery {
            path: path.into(),
            query: Box::new(query),
        }
    }

    /// Set of logical field names referenced by this expression.
    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Variable(v) => {
                out.insert(v.clone());
            }
            Expr::Literal(_) | Expr::Null | Expr::True | Expr::False | Expr::Script(_) => {}
            Expr::And(terms) | Expr::Or(terms) | Expr::Tuple(terms) | Expr::Coalesce(terms) => {
                for t in terms {
                    t.collect_vars(out);
                }
            }
            Expr::Not(t)
            | Expr::Missing(t)
            | Expr::Exists(t)
            | Expr::BooleanCast(t)
            | Expr::StringCast(t)
            | Expr::Length(t)
            | Expr::Leaves(t) => t.collect_vars(out),
            Expr::Eq { lhs, rhs }
            | Expr::BasicEq { lhs, rhs }
            | Expr::Ne { lhs, rhs }
            | Expr::Inequality { lhs, rhs, .. }
            | Expr::Div { lhs, rhs }
            | Expr::Floor { lhs, rhs } => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
            Expr::Prefix { expr, prefix } => {
                expr.collect_vars(out);
                prefix.collect_vars(out);
            }
            Expr::Suffix { expr, suffix } => {
                expr.collect_vars(out);
                suffix.collect_vars(out);
            }
            Expr::Contains { expr, find } => {
                expr.collect_vars(out);
                find.collect_vars(out);
            }
            Expr::RegExp { expr, pattern } => {
                expr.collect_vars(out);
                pattern.collect_vars(out);
            }
            Expr::In { value, superset } => {
                value.collect_vars(out);
                superset.collect_vars(out);
            }
            Expr::Case { whens, default } => {
                for w in whens {
                    w.when.collect_vars(out);
                    w.then.collect_vars(out);
                }
                default.collect_vars(out);
            }
            Expr::NestedQuery { query, .. } => query.collect_vars(out),
        }
    }

    /// Rename variables according to `renames`, returning a new tree.
    /// Names with no entry are left unchanged.
    pub fn map(&self, renames: &BTreeMap<String, String>) -> Expr {
        match self {
            Expr::Variable(v) => match renames.get(v) {
                Some(new_name) => Expr::Variable(new_name.clone()),
                None => self.clone(),
            },
            Expr::Literal(_) | Expr::Null | Expr::True | Expr::False | Expr::Script(_) => {
                self.clone()
            }
            Expr::And(terms) => Expr::And(terms.iter().map(|t| t.map(renames)).collect()),
            Expr::Or(terms) => Expr::Or(terms.iter().map(|t| t.map(renames)).collect()),
            Expr::Tuple(terms) => Expr::Tuple(terms.iter().map(|t| t.map(renames)).collect()),
            Expr::Coalesce(terms) => Expr::Coalesce(terms.iter().map(|t| t.map(renames)).collect()),
            Expr::Not(t) => Expr::not(t.map(renames)),
            Expr::Missing(t) => Expr::missing_of(t.map(renames)),
            Expr::Exists(t) => Expr::exists(t.map(renames)),
            Expr::BooleanCast(t) => Expr::BooleanCast(Box::new(t.map(renames))),
            Expr::StringCast(t) => Expr::StringCast(Box::new(t.map(renames))),
            Expr::Length(t) => Expr::Length(Box::new(t.map(renames))),
            Expr::Leaves(t) => Expr::Leaves(Box::new(t.map(renames))),
            Expr::Eq { lhs, rhs } => Expr::eq(lhs.map(renames), rhs.map(renames)),
            Expr::BasicEq { lhs, rhs } => Expr::basic_eq(lhs.map(renames), rhs.map(renames)),
            Expr::Ne { lhs, rhs } => Expr::ne(lhs.map(renames), rhs.map(renames)),
            Expr::Inequality { op, lhs, rhs } => {
                Expr::cmp(*op, lhs.map(renames), rhs.map(renames))
            }
            Expr::Div { lhs, rhs } => Expr::Div {
                lhs: Box::new(lhs.map(renames)),
                rhs: Box::new(rhs.map(renames)),
            },
            Expr::Floor { lhs, rhs } => Expr::Floor {
                lhs: Box::new(lhs.map(renames)),
                rhs: Box::new(rhs.map(renames)),
            },
            Expr::Prefix { expr, prefix } => Expr::prefix(expr.map(renames), prefix.map(renames)),
            Expr::Suffix { expr, suffix } => Expr::suffix(expr.map(renames), suffix.map(renames)),
            Expr::Contains { expr, find } => Expr::contains(expr.map(renames), find.map(renames)),
            Expr::RegExp { expr, pattern } => Expr::regexp(expr.map(renames), pattern.map(renames)),
            Expr::In { value, superset } => Expr::is_in(value.map(renames), superset.map(renames)),
            Expr::Case { whens, default } => Expr::case(
                whens
                    .iter()
                    .map(|w| When::new(w.when.map(renames), w.then.map(renames)))
                    .collect(),
                default.map(renames),
            ),
            Expr::NestedQuery { path, query } => Expr::nested(path.clone(), query.map(renames)),
        }
    }

    /// The predicate that is true exactly when this expression has no value.
    ///
    /// Boolean-valued expressions always produce a value, so their missing
    /// predicate is `False`. Value-producing expressions are missing when
    /// their operands are, plus per-variant conditions (division is missing
    /// on a zero divisor).
    pub fn missing(&self) -> Expr {
        match self {
            Expr::Variable(v) => Expr::missing_of(Expr::Variable(v.clone())),
            Expr::Null => Expr::True,
            Expr::Literal(Value::Null) => Expr::True,
            Expr::Literal(_) | Expr::True | Expr::False => Expr::False,
            Expr::And(_)
            | Expr::Or(_)
            | Expr::Not(_)
            | Expr::Eq { .. }
            | Expr::BasicEq { .. }
            | Expr::Ne { .. }
            | Expr::Missing(_)
            | Expr::Exists(_)
            | Expr::BooleanCast(_)
            | Expr::Prefix { .. }
            | Expr::Suffix { .. }
            | Expr::Contains { .. }
            | Expr::RegExp { .. }
            | Expr::In { .. }
            | Expr::NestedQuery { .. }
            | Expr::Script(_) => Expr::False,
            Expr::Inequality { lhs, rhs, .. } => Expr::or(vec![lhs.missing(), rhs.missing()]),
            Expr::StringCast(t) | Expr::Length(t) | Expr::Leaves(t) => t.missing(),
            Expr::Div { lhs, rhs } | Expr::Floor { lhs, rhs } => Expr::or(vec![
                lhs.missing(),
                rhs.missing(),
                Expr::eq(rhs.as_ref().clone(), Expr::literal(Value::from(0))),
            ]),
            Expr::Coalesce(terms) => {
                if terms.is_empty() {
                    Expr::True
                } else {
                    Expr::and(terms.iter().map(|t| t.missing()).collect())
                }
            }
            Expr::Case { whens, default } => {
                let mut branches: Vec<Expr> = whens
                    .iter()
                    .map(|w| Expr::and(vec![w.when.clone(), w.then.missing()]))
                    .collect();
                branches.push(default.missing());
                Expr::or(branches)
            }
            Expr::Tuple(_) => Expr::False,
        }
    }

    /// Declared value type of this expression.
    pub fn data_type(&self, schema: &Schema) -> JsonType {
        match self {
            Expr::Variable(v) => {
                let cols = schema.leaves(v);
                match cols.as_slice() {
                    [only] => only.json_type,
                    _ => JsonType::Object,
                }
            }
            Expr::Literal(v) => JsonType::of(v),
            Expr::Null => JsonType::Null,
            Expr::True | Expr::False => JsonType::Boolean,
            Expr::And(_)
            | Expr::Or(_)
            | Expr::Not(_)
            | Expr::Eq { .. }
            | Expr::BasicEq { .. }
            | Expr::Ne { .. }
            | Expr::Inequality { .. }
            | Expr::Missing(_)
            | Expr::Exists(_)
            | Expr::BooleanCast(_)
            | Expr::Prefix { .. }
            | Expr::Suffix { .. }
            | Expr::Contains { .. }
            | Expr::RegExp { .. }
            | Expr::In { .. }
            | Expr::NestedQuery { .. } => JsonType::Boolean,
            Expr::StringCast(_) => JsonType::String,
            Expr::Length(_) => JsonType::Integer,
            Expr::Div { .. } | Expr::Floor { .. } => JsonType::Number,
            Expr::Case { whens, default } => whens
                .first()
                .map(|w| w.then.data_type(schema))
                .unwrap_or_else(|| default.data_type(schema)),
            Expr::Coalesce(terms) => terms
                .first()
                .map(|t| t.data_type(schema))
                .unwrap_or(JsonType::Null),
            Expr::Tuple(_) | Expr::Leaves(_) => JsonType::Object,
            Expr::Script(_) => JsonType::Object,
        }
    }
}
