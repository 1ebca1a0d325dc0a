//! Backend lowering: expression nodes to filter fragments.
//!
//! This module provides:
//! - The per-variant lowering dispatch (`to_filter`)
//! - The embedded-script fallback used when no structural mapping exists

pub mod script;
pub mod to_filter;

pub use script::{box_value, script_accessor, script_type, to_es_script, EsScript, ScriptMiss};
pub use to_filter::to_filter;
