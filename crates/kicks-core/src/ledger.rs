//! # Kardex Math
//!
//! The stock rules shared by the Local Store transaction and anything that
//! needs to audit a product's movement history.
//!
//! ## Zero-Floor Clamping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  previous  delta    previous+delta   new_stock                          │
//! │  ────────  ─────    ──────────────   ─────────                          │
//! │     5       -3            2              2                              │
//! │     2       -5           -3              0   ← oversell sells to zero   │
//! │     0       +6            6              6                              │
//! │                                                                         │
//! │  The movement keeps the raw delta (-5), so the deficit stays visible    │
//! │  in the kardex even though the shelf count cannot go below zero.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::StockMovement;

/// New stock after applying `delta` to `previous`, never below zero.
#[inline]
pub fn clamp_stock(previous: i64, delta: i64) -> i64 {
    previous.saturating_add(delta).max(0)
}

/// The three numbers a kardex entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    pub previous_stock: i64,
    /// Requested delta, unclamped.
    pub delta: i64,
    pub new_stock: i64,
}

impl StockChange {
    pub fn compute(previous_stock: i64, delta: i64) -> Self {
        StockChange {
            previous_stock,
            delta,
            new_stock: clamp_stock(previous_stock, delta),
        }
    }

    /// Units requested but not available (oversell), zero otherwise.
    pub fn shortfall(&self) -> i64 {
        (self.previous_stock.saturating_add(self.delta)).min(0).abs()
    }

    /// Change that brings the shelf to an absolute count.
    pub fn to_target(previous_stock: i64, target: i64) -> Self {
        StockChange::compute(previous_stock, target - previous_stock)
    }
}

/// Replays movements (oldest first) from an opening count.
///
/// Every step is clamped exactly like a live adjustment.
pub fn replay<'a, I>(opening_stock: i64, movements: I) -> i64
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    movements
        .into_iter()
        .fold(opening_stock, |stock, m| clamp_stock(stock, m.quantity))
}

/// First movement whose recorded numbers disagree with a replay.
///
/// `None` means the kardex is internally consistent and ends at
/// `current_stock`. A break in the chain at index `i` returns `Some(i)`;
/// an end mismatch returns `Some(len)`.
pub fn audit<'a, I>(movements: I, current_stock: i64) -> Option<usize>
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    let mut stock: Option<i64> = None;
    let mut count = 0;

    for (idx, m) in movements.into_iter().enumerate() {
        count = idx + 1;
        let previous = stock.unwrap_or(m.previous_stock);
        if m.previous_stock != previous || m.new_stock != clamp_stock(previous, m.quantity) {
            return Some(idx);
        }
        stock = Some(m.new_stock);
    }

    match stock {
        Some(s) if s != current_stock => Some(count),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MovementType;
    use chrono::Utc;

    fn movement(quantity: i64, previous: i64, new: i64) -> StockMovement {
        StockMovement {
            id: 0,
            product_id: 1,
            product_name: "Gel-Kayano 14".to_string(),
            movement_type: if quantity > 0 {
                MovementType::Restock
            } else {
                MovementType::Sale
            },
            quantity,
            previous_stock: previous,
            new_stock: new,
            timestamp: Utc::now(),
            user_id: None,
            user_name: "system".to_string(),
            note: None,
            reference_id: None,
        }
    }

    #[test]
    fn test_sale_within_stock() {
        let change = StockChange::compute(5, -3);
        assert_eq!(change.new_stock, 2);
        assert_eq!(change.delta, -3);
        assert_eq!(change.shortfall(), 0);
    }

    #[test]
    fn test_oversell_clamps_to_zero() {
        let change = StockChange::compute(2, -5);
        assert_eq!(change.previous_stock, 2);
        assert_eq!(change.delta, -5);
        assert_eq!(change.new_stock, 0);
        assert_eq!(change.shortfall(), 3);
    }

    #[test]
    fn test_clamp_never_negative() {
        for start in 0..10 {
            for delta in -20..20 {
                let new = clamp_stock(start, delta);
                assert!(new >= 0);
                assert_eq!(new, (start + delta).max(0));
            }
        }
    }

    #[test]
    fn test_to_target() {
        let change = StockChange::to_target(7, 3);
        assert_eq!(change.delta, -4);
        assert_eq!(change.new_stock, 3);
    }

    #[test]
    fn test_replay_reproduces_final_stock() {
        // Live sequence: 0 +5 → 5, -3 → 2, -5 → 0 (clamped), +4 → 4
        let deltas = [5, -3, -5, 4];
        let mut stock = 0;
        let mut ledger = Vec::new();
        for d in deltas {
            let change = StockChange::compute(stock, d);
            ledger.push(movement(d, change.previous_stock, change.new_stock));
            stock = change.new_stock;
        }

        assert_eq!(stock, 4);
        assert_eq!(replay(0, &ledger), stock);
        assert_eq!(audit(&ledger, stock), None);
    }

    #[test]
    fn test_audit_detects_tampering() {
        let ledger = vec![movement(5, 0, 5), movement(-3, 5, 2)];
        assert_eq!(audit(&ledger, 2), None);
        assert_eq!(audit(&ledger, 3), Some(2));

        let broken = vec![movement(5, 0, 5), movement(-3, 4, 1)];
        assert_eq!(audit(&broken, 1), Some(1));
    }
}
