//! Reordering a chosen set of rows in one pass.

use std::collections::HashSet;

use tracing::info;

use super::Positioning;
use crate::Result;
use crate::store::sql::Sql;
use crate::value::Key;

/// The order rows should end up in.
///
/// Built from a list of keys or from key/weight pairs. Missing keys (and
/// weights) are dropped, and a key listed twice keeps its first place.
///
/// ```
/// use positioning::{Key, RepositionOrder};
///
/// let order = RepositionOrder::from_weights([
///     (Some(3), Some(2.0)),
///     (Some(1), Some(0.5)),
///     (None, Some(0.1)),
///     (Some(2), Some(2.0)),
/// ]);
/// assert_eq!(order.keys(), [Key::from(1), Key::from(3), Key::from(2)]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositionOrder {
    keys: Vec<Key>,
}

impl RepositionOrder {
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Self::from_optional_keys(keys.into_iter().map(Some))
    }

    pub fn from_optional_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = Option<K>>,
        K: Into<Key>,
    {
        let mut seen = HashSet::new();
        let keys = keys
            .into_iter()
            .flatten()
            .map(Into::into)
            .filter(|key: &Key| !key.is_blank())
            .filter(|key| seen.insert(key.clone()))
            .collect();
        Self { keys }
    }

    /// Order by ascending weight; equal weights keep their input order.
    pub fn from_weights<I, K, W>(weights: I) -> Self
    where
        I: IntoIterator<Item = (Option<K>, Option<W>)>,
        K: Into<Key>,
        W: Into<f64>,
    {
        let mut weighted: Vec<(K, f64)> = weights
            .into_iter()
            .filter_map(|(key, weight)| Some((key?, weight?.into())))
            .collect();
        weighted.sort_by(|a, b| a.1.total_cmp(&b.1));
        Self::from_keys(weighted.into_iter().map(|(key, _)| key))
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Outcome of a reposition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositionReport {
    pub scopes: usize,
    pub rows: u64,
}

impl Positioning {
    /// Put the listed rows of `column` in the given order.
    ///
    /// Within each scope the listed rows take the positions they already
    /// occupy between them, reassigned in list order; other rows keep their
    /// places. Reordering `[D, B]` within `[A, B, C, D, E]` yields
    /// `[A, D, C, B, E]`. Each scope is handled in its own transaction.
    /// Keys that match no row are ignored.
    pub async fn reposition(&self, column: &str, order: &RepositionOrder) -> Result<RepositionReport> {
        let mechanism = self.mechanism(column)?;
        let keys: Vec<Key> = order
            .keys()
            .iter()
            .filter(|key| self.key_matches(key))
            .cloned()
            .collect();
        let mut report = RepositionReport::default();
        if keys.is_empty() {
            return Ok(report);
        }

        for scope in self.scopes(&mechanism, Some(keys.as_slice())).await? {
            let mut tx = self.store.begin().await?;
            mechanism.lock(&mut tx, vec![scope.clone()]).await?;

            // Membership is read again under the lock. Rows without a
            // position have no slot to give and are left to heal.
            let mut members = Vec::new();
            let mut slots = Vec::new();
            for key in &keys {
                if let Some(position) = mechanism.placed_position_in(&mut tx, &scope, key).await? {
                    members.push(key.clone());
                    slots.push(position);
                }
            }
            let Some(&max) = slots.iter().max() else {
                tx.commit().await?;
                continue;
            };
            slots.sort_unstable();

            let mut park = Sql::new("UPDATE ");
            park.push_ident(mechanism.table())
                .push(" SET ")
                .push_ident(mechanism.name())
                .push(" = ")
                .push_ident(mechanism.name())
                .push(" - ")
                .push_bind(max + 1)
                .push(" WHERE ")
                .push_scope(&scope)
                .push(" AND ")
                .push_keys(self.schema.primary_key(), &members);
            park.execute(tx.conn(), "Failed to park repositioned rows")
                .await?;

            for (key, position) in members.iter().zip(&slots) {
                mechanism.write_own(&mut tx, key, *position).await?;
            }
            tx.commit().await?;

            info!(
                table = mechanism.table(),
                column,
                scope = %scope,
                rows = members.len(),
                "Repositioned rows"
            );
            report.scopes += 1;
            report.rows += members.len() as u64;
        }
        Ok(report)
    }
}
