//! Scope tuples.

use std::fmt;

use crate::config::TrackedColumn;
use crate::value::Value;

/// One scope of a tracked column: the scope columns paired with the values
/// a row holds in them.
///
/// Scopes order lexicographically by their values, which is the canonical
/// order locks are taken in. An unscoped column has a single empty scope
/// covering the whole table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope {
    components: Vec<(String, Value)>,
}

impl Scope {
    pub fn new(components: Vec<(String, Value)>) -> Self {
        Self { components }
    }

    /// The scope covering the whole table.
    pub fn unscoped() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Build the scope of `column` from a value lookup.
    pub fn of(column: &TrackedColumn, mut value: impl FnMut(&str) -> Value) -> Self {
        Self {
            components: column
                .scope_columns()
                .iter()
                .map(|c| (c.clone(), value(c)))
                .collect(),
        }
    }

    pub fn components(&self) -> &[(String, Value)] {
        &self.components
    }

    pub fn is_unscoped(&self) -> bool {
        self.components.is_empty()
    }

    /// The value of one scope column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.components
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "(all rows)");
        }
        for (i, (column, value)) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}={value}")?;
        }
        Ok(())
    }
}
