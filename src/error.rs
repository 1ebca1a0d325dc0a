//! Compile-layer error types.

use thiserror::Error;

/// Errors that can occur while compiling an expression to a backend filter.
///
/// All of these are fatal to the compile call that raised them: no partial
/// filter is ever returned, and the compiler never retries internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Unsupported construct: {construct} has no backend filter form")]
    UnsupportedConstruct { construct: String },

    #[error("Ambiguous schema: {field} resolves to {columns} columns where exactly one is required")]
    AmbiguousSchema { field: String, columns: usize },

    #[error("Cannot decompose expression: {construct} spans multiple nested scopes")]
    NonDecomposableExpression { construct: String },

    #[error("Inequality {op} is not decisive: an operand may be missing")]
    IndecisiveInequality { op: String },
}

impl CompileError {
    /// Shorthand for the most common error kind.
    pub fn unsupported(construct: impl Into<String>) -> Self {
        CompileError::UnsupportedConstruct {
            construct: construct.into(),
        }
    }
}

/// Result type for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
