//! Declarations of positioned types.
//!
//! A host type describes its table once, at startup, with a [`TableSchema`]:
//! the primary key, the belongs-to relations that scope components may name,
//! an optional modification timestamp column, and one [`Positioned`]
//! declaration per tracked column. Schemas are collected into a read-only
//! [`Registry`].
//!
//! ```
//! use positioning::config::{BelongsTo, Positioned, TableSchema};
//!
//! let items = TableSchema::builder("Item", "items")
//!     .belongs_to(BelongsTo::new("list").parent_table("lists"))
//!     .positioned(Positioned::on(["list"]))?
//!     .build()?;
//!
//! assert_eq!(items.tracked("position").unwrap().scope_columns(), ["list_id"]);
//! # Ok::<(), positioning::Error>(())
//! ```

mod errors;

pub use errors::ConfigurationError;

use std::collections::HashMap;
use std::sync::Arc;

use crate::lock::LockStrategy;

/// A belongs-to relation usable as a scope component.
///
/// Naming the relation in a scope expands to its foreign key column, plus the
/// type column when the relation is polymorphic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsTo {
    name: String,
    foreign_key: String,
    foreign_type: Option<String>,
    parent_table: Option<String>,
    parent_primary_key: String,
}

impl BelongsTo {
    /// A relation `name` stored in `{name}_id`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            foreign_key: format!("{name}_id"),
            foreign_type: None,
            parent_table: None,
            parent_primary_key: "id".to_string(),
            name,
        }
    }

    /// A polymorphic relation stored in `{name}_id` and `{name}_type`.
    pub fn polymorphic(name: impl Into<String>) -> Self {
        let mut relation = Self::new(name);
        relation.foreign_type = Some(format!("{}_type", relation.name));
        relation
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = column.into();
        self
    }

    /// The table holding the parent rows.
    ///
    /// Row locking locks the parent row instead of every sibling when this is
    /// known. Polymorphic relations have no single parent table.
    pub fn parent_table(mut self, table: impl Into<String>) -> Self {
        self.parent_table = Some(table.into());
        self
    }

    pub fn parent_primary_key(mut self, column: impl Into<String>) -> Self {
        self.parent_primary_key = column.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn foreign_key_column(&self) -> &str {
        &self.foreign_key
    }

    pub fn foreign_type_column(&self) -> Option<&str> {
        self.foreign_type.as_deref()
    }

    /// Parent table and primary key, when the parent row can be locked.
    pub fn lockable_parent(&self) -> Option<(&str, &str)> {
        match (&self.parent_table, &self.foreign_type) {
            (Some(table), None) => Some((table.as_str(), self.parent_primary_key.as_str())),
            _ => None,
        }
    }
}

/// Declaration of one tracked column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positioned {
    on: Vec<String>,
    column: String,
    lock: LockStrategy,
}

impl Positioned {
    /// Track `position` within the scope formed by `components`.
    ///
    /// Each component is either a column name or the name of a declared
    /// belongs-to relation.
    pub fn on<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            on: components.into_iter().map(Into::into).collect(),
            column: "position".to_string(),
            lock: LockStrategy::default(),
        }
    }

    /// Track `position` over the whole table.
    pub fn unscoped() -> Self {
        Self::on(Vec::<String>::new())
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn lock(mut self, lock: LockStrategy) -> Self {
        self.lock = lock;
        self
    }
}

/// A tracked column with its scope resolved to concrete columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedColumn {
    column: String,
    scope_columns: Vec<String>,
    scope_relations: Vec<BelongsTo>,
    lock: LockStrategy,
}

impl TrackedColumn {
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The columns whose combined values define scope membership.
    pub fn scope_columns(&self) -> &[String] {
        &self.scope_columns
    }

    /// The belongs-to relations named in the scope.
    pub fn scope_relations(&self) -> &[BelongsTo] {
        &self.scope_relations
    }

    pub fn lock(&self) -> LockStrategy {
        self.lock
    }

    pub fn is_scoped(&self) -> bool {
        !self.scope_columns.is_empty()
    }

    /// Whether destroying rows through `foreign_key` empties whole scopes.
    pub fn is_scoped_by(&self, foreign_key: &str) -> bool {
        self.scope_columns.iter().any(|c| c == foreign_key)
    }
}

/// Table-level description of a positioned type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    type_name: String,
    table: String,
    primary_key: Vec<String>,
    base_type: Option<String>,
    relations: Vec<BelongsTo>,
    timestamp_column: Option<String>,
    columns: Vec<TrackedColumn>,
}

impl TableSchema {
    pub fn builder(type_name: impl Into<String>, table: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            schema: TableSchema {
                type_name: type_name.into(),
                table: table.into(),
                primary_key: vec!["id".to_string()],
                base_type: None,
                relations: Vec::new(),
                timestamp_column: None,
                columns: Vec::new(),
            },
            declared: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn base_type(&self) -> Option<&str> {
        self.base_type.as_deref()
    }

    pub fn relations(&self) -> &[BelongsTo] {
        &self.relations
    }

    /// Column bumped to the transaction time on every shifted row.
    pub fn timestamp_column(&self) -> Option<&str> {
        self.timestamp_column.as_deref()
    }

    pub fn columns(&self) -> &[TrackedColumn] {
        &self.columns
    }

    pub fn tracked(&self, column: &str) -> Option<&TrackedColumn> {
        self.columns.iter().find(|c| c.column == column)
    }
}

/// Builder for [`TableSchema`].
#[derive(Debug)]
pub struct TableSchemaBuilder {
    schema: TableSchema,
    declared: Vec<Positioned>,
}

impl TableSchemaBuilder {
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn belongs_to(mut self, relation: BelongsTo) -> Self {
        self.schema.relations.push(relation);
        self
    }

    /// Declare a modification timestamp column (BIGINT milliseconds).
    pub fn timestamps(mut self, column: impl Into<String>) -> Self {
        self.schema.timestamp_column = Some(column.into());
        self
    }

    /// Mark this type as a subtype sharing `base`'s table and positioning.
    pub fn subtype_of(mut self, base: impl Into<String>) -> Self {
        self.schema.base_type = Some(base.into());
        self
    }

    /// Declare a tracked column.
    pub fn positioned(mut self, declaration: Positioned) -> Result<Self, ConfigurationError> {
        if let Some(base) = &self.schema.base_type {
            return Err(ConfigurationError::NotRootType {
                type_name: self.schema.type_name.clone(),
                base: base.clone(),
            });
        }
        if declaration.column.is_empty() {
            return Err(ConfigurationError::EmptyName {
                type_name: self.schema.type_name.clone(),
                what: "column",
            });
        }
        if let Some(existing) = self.declared.iter().find(|d| d.column == declaration.column) {
            return Err(ConfigurationError::DuplicateColumn {
                type_name: self.schema.type_name.clone(),
                column: declaration.column.clone(),
                scope: existing.on.clone(),
            });
        }
        self.declared.push(declaration);
        Ok(self)
    }

    /// Resolve scope components and freeze the schema.
    ///
    /// Relations are resolved here rather than in [`positioned`](Self::positioned)
    /// so that declaration order does not matter.
    pub fn build(mut self) -> Result<TableSchema, ConfigurationError> {
        if self.schema.table.is_empty() {
            return Err(ConfigurationError::EmptyName {
                type_name: self.schema.type_name.clone(),
                what: "table",
            });
        }
        if self.schema.primary_key.is_empty() {
            return Err(ConfigurationError::MissingPrimaryKey {
                type_name: self.schema.type_name.clone(),
            });
        }

        for declaration in std::mem::take(&mut self.declared) {
            let mut scope_columns = Vec::new();
            let mut scope_relations = Vec::new();
            for component in &declaration.on {
                match self.schema.relations.iter().find(|r| &r.name == component) {
                    Some(relation) => {
                        scope_columns.push(relation.foreign_key.clone());
                        if let Some(type_column) = &relation.foreign_type {
                            scope_columns.push(type_column.clone());
                        }
                        scope_relations.push(relation.clone());
                    }
                    None => scope_columns.push(component.clone()),
                }
            }
            self.schema.columns.push(TrackedColumn {
                column: declaration.column,
                scope_columns,
                scope_relations,
                lock: declaration.lock,
            });
        }

        Ok(self.schema)
    }
}

/// Read-only map from type name to schema.
///
/// Subtypes resolve to their root type's schema, so every member of a
/// hierarchy shares scopes and locks.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: HashMap<String, Arc<TableSchema>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, type_name: &str) -> Result<&Arc<TableSchema>, ConfigurationError> {
        self.types
            .get(type_name)
            .ok_or_else(|| ConfigurationError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Root schemas, one per hierarchy, sorted by type name.
    pub fn roots(&self) -> Vec<&Arc<TableSchema>> {
        let mut roots: Vec<_> = self
            .types
            .iter()
            .filter(|(name, schema)| schema.type_name() == name.as_str())
            .map(|(_, schema)| schema)
            .collect();
        roots.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        roots
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    roots: Vec<TableSchema>,
    subtypes: Vec<(String, String)>,
}

impl RegistryBuilder {
    pub fn register(mut self, schema: TableSchema) -> Result<Self, ConfigurationError> {
        let name = schema.type_name().to_string();
        if self.contains(&name) {
            return Err(ConfigurationError::DuplicateType { type_name: name });
        }
        match schema.base_type() {
            Some(base) => self.subtypes.push((name, base.to_string())),
            None => self.roots.push(schema),
        }
        Ok(self)
    }

    fn contains(&self, name: &str) -> bool {
        self.roots.iter().any(|s| s.type_name() == name)
            || self.subtypes.iter().any(|(sub, _)| sub == name)
    }

    pub fn build(self) -> Result<Registry, ConfigurationError> {
        let mut types: HashMap<String, Arc<TableSchema>> = self
            .roots
            .into_iter()
            .map(|s| (s.type_name().to_string(), Arc::new(s)))
            .collect();

        for (name, base) in &self.subtypes {
            let root = resolve_root(&types, &self.subtypes, base).ok_or_else(|| {
                ConfigurationError::UnknownBaseType {
                    type_name: name.clone(),
                    base: base.clone(),
                }
            })?;
            types.insert(name.clone(), root);
        }

        Ok(Registry { types })
    }
}

/// Follow `base` up the hierarchy to a registered root.
fn resolve_root(
    roots: &HashMap<String, Arc<TableSchema>>,
    subtypes: &[(String, String)],
    base: &str,
) -> Option<Arc<TableSchema>> {
    let mut current = base;
    // Bounded walk; a cycle among subtypes never reaches a root.
    for _ in 0..=subtypes.len() {
        if let Some(root) = roots.get(current) {
            return Some(root.clone());
        }
        current = subtypes.iter().find(|(sub, _)| sub == current)?.1.as_str();
    }
    None
}
