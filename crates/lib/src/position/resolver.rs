//! Turning a directive into a concrete position.
//!
//! Resolution happens in two steps. The mechanism first looks up what the
//! directive depends on (the scope's extent, the acting row's membership,
//! the referenced row's position) and produces a [`Placement`]; [`solidify`]
//! then does the arithmetic without touching the store.

use super::PositionDirective;

/// A directive with its references looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Absolute(i64),
    Start,
    End,
    /// Before the row currently at this position.
    Before(i64),
    /// After the row currently at this position.
    After(i64),
}

impl Placement {
    /// `reference` is the current position of the row named by a relative
    /// directive; it is only consulted for `Before(Some)`/`After(Some)`.
    pub fn of(directive: &PositionDirective, reference: Option<i64>) -> Self {
        match (directive, reference) {
            (PositionDirective::Absolute(n), _) => Placement::Absolute(*n),
            (PositionDirective::First, _) | (PositionDirective::After(None), _) => Placement::Start,
            (PositionDirective::Before(Some(_)), Some(p)) => Placement::Before(p),
            (PositionDirective::After(Some(_)), Some(p)) => Placement::After(p),
            _ => Placement::End,
        }
    }
}

/// The destination scope as seen by the acting row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    /// Highest position in the scope.
    pub max_position: i64,
    /// Stored position of the acting row, when it is already in the scope.
    pub position_was: Option<i64>,
}

impl Extent {
    /// The last position the acting row can take: one past the end when it
    /// is joining the scope.
    pub fn last_position(&self) -> i64 {
        let last = match self.position_was {
            Some(_) => self.max_position,
            None => self.max_position + 1,
        };
        last.max(1)
    }
}

/// Compute the target position of the acting row.
pub(crate) fn solidify(placement: Placement, extent: &Extent) -> i64 {
    let last = extent.last_position();
    match placement {
        Placement::Absolute(n) => n.clamp(1, last),
        Placement::Start => 1,
        Placement::End => last,
        Placement::Before(p) => adjust(p, extent),
        Placement::After(p) => adjust(p + 1, extent),
    }
}

/// A row moving down within its own scope vacates its old slot, so every
/// slot above it shifts down by one.
fn adjust(position: i64, extent: &Extent) -> i64 {
    match extent.position_was {
        Some(was) if was < position => position - 1,
        _ => position,
    }
}
