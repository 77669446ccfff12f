//! The row interface the engine works against, and a dynamic row.

use std::collections::{BTreeMap, BTreeSet};

use crate::position::PositionDirective;
use crate::value::{Key, Value};

/// A host row carrying one or more tracked position columns.
///
/// The engine never loads rows itself; it asks the row for its scope values
/// (current and as last persisted), for the position directive assigned since
/// the last save, and writes the resolved position back.
pub trait ScopedPositionable: Send + Sync {
    /// Primary key of the persisted row, `None` before the first insert.
    fn key(&self) -> Option<Key>;

    /// Current, possibly unsaved, value of `column`.
    fn attribute(&self, column: &str) -> Value;

    /// Value of `column` as last persisted.
    fn attribute_was(&self, column: &str) -> Value;

    fn attribute_changed(&self, column: &str) -> bool {
        self.attribute(column) != self.attribute_was(column)
    }

    /// Directive assigned to the tracked `column` since the last save.
    fn position_directive(&self, column: &str) -> Option<PositionDirective>;

    /// Store the resolved position of `column`. The host must persist it even
    /// when it equals the previous value.
    fn write_position(&mut self, column: &str, position: i64);

    /// The foreign key through which this row is being destroyed as a
    /// dependent of its parent, if it is.
    fn destroyed_by_association(&self) -> Option<&str> {
        None
    }
}

/// A row held as a map of column values, with dirty tracking.
///
/// ```
/// use positioning::{PositionDirective, Record, Value};
///
/// let mut item = Record::new().with("name", "First").with("list_id", 1);
/// item.set_position("position", PositionDirective::First);
/// assert_eq!(item.get("list_id"), &Value::Int(1));
/// assert!(!item.is_persisted());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    key: Option<Key>,
    attributes: BTreeMap<String, Value>,
    persisted: BTreeMap<String, Value>,
    directives: BTreeMap<String, PositionDirective>,
    forced: BTreeSet<String>,
    destroyed_by: Option<String>,
}

static NULL: Value = Value::Null;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record loaded from the store: every attribute is clean.
    pub fn persisted(key: Key, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            key: Some(key),
            persisted: attributes.clone(),
            attributes,
            ..Self::default()
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn with_position(mut self, column: &str, directive: impl Into<PositionDirective>) -> Self {
        self.set_position(column, directive);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.attributes.insert(column.to_string(), value.into());
    }

    /// Assign a directive to a tracked column; it is resolved on the next save.
    pub fn set_position(&mut self, column: &str, directive: impl Into<PositionDirective>) {
        self.directives.insert(column.to_string(), directive.into());
    }

    pub fn get(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    /// Current integer value of a position column.
    pub fn position(&self, column: &str) -> Option<i64> {
        self.get(column).as_int()
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.key.is_some()
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Columns that must be written on the next save.
    pub fn changed_columns(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(column, value)| {
                self.forced.contains(column.as_str())
                    || self.persisted.get(column.as_str()).unwrap_or(&NULL) != *value
            })
            .map(|(column, _)| column.as_str())
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_columns().is_empty()
    }

    /// Mark the record as a dependent being destroyed through `foreign_key`.
    pub fn mark_destroyed_by(&mut self, foreign_key: &str) {
        self.destroyed_by = Some(foreign_key.to_string());
    }

    /// Snapshot the current attributes as persisted under `key`.
    pub(crate) fn mark_persisted(&mut self, key: Key) {
        self.key = Some(key);
        self.persisted = self.attributes.clone();
        self.directives.clear();
        self.forced.clear();
    }
}

impl ScopedPositionable for Record {
    fn key(&self) -> Option<Key> {
        self.key.clone()
    }

    fn attribute(&self, column: &str) -> Value {
        self.get(column).clone()
    }

    fn attribute_was(&self, column: &str) -> Value {
        self.persisted.get(column).cloned().unwrap_or_default()
    }

    fn position_directive(&self, column: &str) -> Option<PositionDirective> {
        self.directives.get(column).cloned()
    }

    fn write_position(&mut self, column: &str, position: i64) {
        self.attributes.insert(column.to_string(), Value::Int(position));
        self.forced.insert(column.to_string());
    }

    fn destroyed_by_association(&self) -> Option<&str> {
        self.destroyed_by.as_deref()
    }
}
