//! Typed query expression tree.
//!
//! This module provides:
//! - The closed expression sum type produced by the upstream query parser
//! - Builder constructors for assembling trees in code
//! - Structural helpers: referenced variables, variable renaming, the
//!   missing-value predicate of an expression
//! - The partial evaluator that simplifies trees before lowering

pub mod expr;
pub mod partial_eval;

pub use expr::{Expr, InequalityOp, When};
