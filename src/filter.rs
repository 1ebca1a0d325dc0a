//! Backend filter fragments.
//!
//! This module provides:
//! - The recursive filter fragment model produced by lowering
//! - Exact wire-JSON serialization matching the backend's filter DSL
//! - The fixpoint normalizer that simplifies fragments algebraically

pub mod fragment;
pub mod normalize;

pub use fragment::{Filter, RangeBounds};
pub use normalize::normalize;
