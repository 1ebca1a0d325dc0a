pub mod compile;
pub mod error;
pub mod expression;
pub mod filter;
pub mod lower;
pub mod schema;
pub mod split;

pub use compile::compile;
pub use error::{CompileError, CompileResult};
pub use expression::Expr;
pub use filter::{normalize, Filter};
pub use schema::{Column, JsonType, OrStrategy, Schema};
