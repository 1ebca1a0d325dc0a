//! Logical field name resolution.

use std::collections::BTreeMap;

use crate::schema::column::{Column, JsonType};

/// How the active backend wants boolean OR lowered.
///
/// Older backend versions evaluate `should` clauses in parallel, losing the
/// short-circuit semantics filters rely on, so OR must be rewritten through
/// De Morgan as `must_not(filter(must_not(..)))`. Newer versions take a
/// native any-of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrStrategy {
    MustNotWrapped,
    Should,
}

/// Maps logical field names to the physical columns that realize them.
///
/// A logical name resolves to zero columns (absent from this index), one
/// column (single observed type), or several (heterogeneous documents, one
/// column per observed type). Every lowering rule must handle all three.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: BTreeMap<String, Vec<Column>>,
    or_strategy: OrStrategy,
}

impl Schema {
    pub fn new(or_strategy: OrStrategy) -> Self {
        Self {
            columns: BTreeMap::new(),
            or_strategy,
        }
    }

    /// Register a column for a logical field name.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.entry(name.into()).or_default().push(column);
        self
    }

    pub fn or_strategy(&self) -> OrStrategy {
        self.or_strategy
    }

    /// Resolve a name to its leaf columns, excluding object and nested
    /// containers. Physical column names resolve to themselves, so
    /// expressions rewritten by the path splitter stay resolvable.
    pub fn leaves(&self, name: &str) -> Vec<&Column> {
        if let Some(cols) = self.columns.get(name) {
            return cols
                .iter()
                .filter(|c| !matches!(c.json_type, JsonType::Object | JsonType::Nested))
                .collect();
        }
        self.columns
            .values()
            .flatten()
            .filter(|c| {
                c.es_column == name && !matches!(c.json_type, JsonType::Object | JsonType::Nested)
            })
            .collect()
    }

    /// Greatest nesting depth among the columns for `name`, 0 when the name
    /// does not resolve.
    pub fn depth_of(&self, name: &str) -> usize {
        self.leaves(name)
            .iter()
            .map(|c| c.depth())
            .max()
            .unwrap_or(0)
    }
}
