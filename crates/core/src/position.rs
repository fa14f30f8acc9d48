//! Global event ordering.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Global ordering tuple `(position, inTxOrder)` assigned at commit.
///
/// `position` is a monotonic decimal derived from a wall-clock-like source
/// stamped at commit time (e.g. `EXTRACT(EPOCH FROM clock_timestamp())`).
/// `inTxOrder` disambiguates events committed in the same transaction, which
/// therefore share the same `position`. Total order is lexicographic on the
/// pair; `position` alone never decreases across committed transactions on a
/// given log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub position: Decimal,
    pub in_tx_order: i32,
}

impl Position {
    pub const ZERO: Position = Position {
        position: Decimal::ZERO,
        in_tx_order: 0,
    };

    pub fn new(position: Decimal, in_tx_order: i32) -> Self {
        Self {
            position,
            in_tx_order,
        }
    }

    /// `true` for the sentinel "from the beginning" position used by
    /// `positionAfter(0,0)` queries.
    pub fn is_origin(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let a = Position::new(Decimal::new(100, 0), 3);
        let b = Position::new(Decimal::new(100, 0), 4);
        let c = Position::new(Decimal::new(101, 0), 0);
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn zero_is_origin() {
        assert!(Position::ZERO.is_origin());
        assert!(!Position::new(Decimal::new(1, 0), 0).is_origin());
    }
}
