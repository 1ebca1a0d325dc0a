//! Resolved physical schema consumed by the compiler.
//!
//! This module provides:
//! - JSON value type classification
//! - Physical column descriptors with nested-path information
//! - The logical-name-to-columns resolver the lowering rules consult

pub mod column;
pub mod resolver;

pub use column::{Column, JsonType};
pub use resolver::{OrStrategy, Schema};
