//! Rebuilding and checking whole scopes.

use std::fmt;
use std::str::FromStr;

use sqlx::Row;
use tracing::info;

use super::Positioning;
use super::mechanism::Mechanism;
use crate::Result;
use crate::scope::Scope;
use crate::store::sql::{Sql, decode_key, decode_scope};
use crate::store::{SqlxResultExt, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Sort order used to rebuild a scope.
///
/// Parsed from a comma separated list of `column[:asc|:desc]` terms, e.g.
/// `"name:desc,position"`. The primary key always breaks remaining ties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBy {
    terms: Vec<(String, Direction)>,
}

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, column: impl Into<String>) -> Self {
        self.terms.push((column.into(), Direction::Asc));
        self
    }

    pub fn desc(mut self, column: impl Into<String>) -> Self {
        self.terms.push((column.into(), Direction::Desc));
        self
    }

    pub fn terms(&self) -> &[(String, Direction)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn push_onto(&self, sql: &mut Sql) {
        for (i, (column, direction)) in self.terms.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_ident(column).push(match direction {
                Direction::Asc => " ASC NULLS LAST",
                Direction::Desc => " DESC NULLS LAST",
            });
        }
    }
}

impl FromStr for OrderBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut order = OrderBy::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (column, direction) = match term.split_once(':') {
                Some((column, direction)) => (column.trim(), direction.trim()),
                None => (term, "asc"),
            };
            if column.is_empty() {
                return Err(format!("missing column in order term `{term}`"));
            }
            order = match direction.to_ascii_lowercase().as_str() {
                "asc" => order.asc(column),
                "desc" => order.desc(column),
                other => return Err(format!("unknown direction `{other}` in `{term}`")),
            };
        }
        Ok(order)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (column, direction)) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match direction {
                Direction::Asc => write!(f, "{column}:asc")?,
                Direction::Desc => write!(f, "{column}:desc")?,
            }
        }
        Ok(())
    }
}

/// Outcome of a heal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealReport {
    pub scopes: usize,
    pub rows: u64,
}

/// Density of one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeReport {
    pub scope: Scope,
    /// Rows in the scope.
    pub rows: i64,
    /// Rows with a non-NULL position.
    pub positioned: i64,
    /// Distinct non-NULL positions.
    pub distinct: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl ScopeReport {
    /// Whether the positions are exactly `1..=rows`.
    pub fn is_dense(&self) -> bool {
        self.rows == 0
            || (self.positioned == self.rows
                && self.distinct == self.rows
                && self.min == Some(1)
                && self.max == Some(self.rows))
    }
}

impl Positioning {
    /// Rewrite every scope of `column` to `1..N`.
    ///
    /// Rows are ordered by `order` (default: their current position), with
    /// the primary key breaking ties, so healing is deterministic and a
    /// second heal changes nothing. Each scope is rebuilt in its own
    /// transaction under the column's lock.
    pub async fn heal(&self, column: &str, order: Option<&OrderBy>) -> Result<HealReport> {
        let mechanism = self.mechanism(column)?;
        let default_order = OrderBy::new().asc(column);
        let order = match order {
            Some(order) if !order.is_empty() => order,
            _ => &default_order,
        };

        let mut report = HealReport::default();
        for scope in self.scopes(&mechanism, None).await? {
            let mut tx = self.store.begin().await?;
            mechanism.lock(&mut tx, vec![scope.clone()]).await?;
            let rows = heal_scope(&mechanism, &mut tx, &scope, order).await?;
            tx.commit().await?;

            info!(
                table = mechanism.table(),
                column,
                scope = %scope,
                rows,
                "Healed scope"
            );
            report.scopes += 1;
            report.rows += rows;
        }
        Ok(report)
    }

    /// Report the density of every scope of `column`.
    pub async fn check(&self, column: &str) -> Result<Vec<ScopeReport>> {
        let mechanism = self.mechanism(column)?;
        let scope_columns = mechanism.column.scope_columns();
        let position = mechanism.name();

        let mut sql = Sql::new("SELECT ");
        if !scope_columns.is_empty() {
            sql.push_idents(scope_columns).push(", ");
        }
        sql.push("COUNT(*), COUNT(")
            .push_ident(position)
            .push("), COUNT(DISTINCT ")
            .push_ident(position)
            .push("), MIN(")
            .push_ident(position)
            .push("), MAX(")
            .push_ident(position)
            .push(") FROM ")
            .push_ident(mechanism.table());
        if !scope_columns.is_empty() {
            sql.push(" GROUP BY ").push_idents(scope_columns);
        }

        let mut conn = self.connection().await?;
        let rows = sql.fetch_all(&mut conn, "Failed to check scopes").await?;
        let n = scope_columns.len();
        let mut reports = rows
            .iter()
            .map(|row| {
                let context = "Failed to read scope report";
                Ok(ScopeReport {
                    scope: decode_scope(row, 0, scope_columns)?,
                    rows: row.try_get::<i64, _>(n).sql_context(context)?,
                    positioned: row.try_get::<i64, _>(n + 1).sql_context(context)?,
                    distinct: row.try_get::<i64, _>(n + 2).sql_context(context)?,
                    min: row.try_get::<Option<i64>, _>(n + 3).sql_context(context)?,
                    max: row.try_get::<Option<i64>, _>(n + 4).sql_context(context)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        reports.sort_by(|a, b| a.scope.cmp(&b.scope));
        Ok(reports)
    }
}

/// Rebuild one locked scope.
async fn heal_scope(
    mechanism: &Mechanism<'_>,
    tx: &mut Transaction,
    scope: &Scope,
    order: &OrderBy,
) -> Result<u64> {
    let table = mechanism.table();
    let column = mechanism.name();
    let primary_key = mechanism.engine.schema().primary_key();

    // Park every row below both zero and the lowest existing value, so that
    // neither the park nor the rewrite collides with a row not yet moved.
    let max = mechanism.max_position(tx, scope).await?;
    let mut min_sql = Sql::new("SELECT MIN(");
    min_sql
        .push_ident(column)
        .push(") FROM ")
        .push_ident(table)
        .push(" WHERE ")
        .push_scope(scope);
    let min = min_sql
        .fetch_int(tx.conn(), "Failed to read scope extent")
        .await?
        .unwrap_or(0);
    let offset = max - min.min(0) + 1;

    let mut park = Sql::new("UPDATE ");
    park.push_ident(table)
        .push(" SET ")
        .push_ident(column)
        .push(" = ")
        .push_ident(column)
        .push(" - ")
        .push_bind(offset)
        .push(" WHERE ")
        .push_scope(scope);
    park.execute(tx.conn(), "Failed to park scope").await?;

    let mut select = Sql::new("SELECT ");
    select
        .push_idents(primary_key)
        .push(" FROM ")
        .push_ident(table)
        .push(" WHERE ")
        .push_scope(scope)
        .push(" ORDER BY ");
    order.push_onto(&mut select);
    for column in primary_key {
        select.push(", ").push_ident(column).push(" ASC");
    }
    let rows = select.fetch_all(tx.conn(), "Failed to read scope").await?;

    let mut position = 0;
    for row in &rows {
        let key = decode_key(row, 0, primary_key.len())?;
        position += 1;
        mechanism.write_own(tx, &key, position).await?;
    }
    Ok(rows.len() as u64)
}
