//! # Merge Policy
//!
//! One rule decides whether an incoming remote copy replaces the local one:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ local copy                   │ outcome                      │
//! ├──────────────────────────────┼──────────────────────────────┤
//! │ missing                      │ apply (insert)               │
//! │ synced = true                │ apply (replace)              │
//! │ synced = false               │ keep local ...               │
//! │   ... unless remote sale is  │ apply (refund always wins)   │
//! │       refunded               │                              │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Applied records come out with `synced = true`. Fields that never travel
//! to the remote store (local id, salesperson id, location, layaway link)
//! are carried over from the local copy.
//!
//! Everything here is pure; pull and the realtime channel both call it.

use kicks_core::{Expense, Product, Sale};

/// What to do with an incoming remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No local counterpart; insert.
    Insert,
    /// Local counterpart exists and may be overwritten.
    Replace,
    /// Local counterpart has pending edits; leave it alone.
    KeepLocal,
}

impl MergeDecision {
    pub fn applies(&self) -> bool {
        !matches!(self, MergeDecision::KeepLocal)
    }
}

/// Result of merging one record.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome<T> {
    /// Write this record (with `synced = true`).
    Apply(T),
    /// The local copy wins; nothing to write.
    Keep,
}

impl<T> MergeOutcome<T> {
    pub fn is_apply(&self) -> bool {
        matches!(self, MergeOutcome::Apply(_))
    }
}

/// The keep-local-unless-terminal rule.
///
/// `local_synced` is `None` when there is no local copy; `remote_terminal`
/// marks an incoming business event that overrides pending local edits.
pub fn decide(local_synced: Option<bool>, remote_terminal: bool) -> MergeDecision {
    match local_synced {
        None => MergeDecision::Insert,
        Some(true) => MergeDecision::Replace,
        Some(false) if remote_terminal => MergeDecision::Replace,
        Some(false) => MergeDecision::KeepLocal,
    }
}

pub fn merge_sale(local: Option<&Sale>, mut remote: Sale) -> MergeOutcome<Sale> {
    if !decide(local.map(|s| s.synced), remote.refunded).applies() {
        return MergeOutcome::Keep;
    }
    if let Some(local) = local {
        remote.id = local.id;
        remote.salesperson_id = remote.salesperson_id.or(local.salesperson_id);
        remote.location = remote.location.or(local.location);
        remote.layaway_id = remote.layaway_id.or(local.layaway_id);
    }
    remote.synced = true;
    MergeOutcome::Apply(remote)
}

pub fn merge_product(local: Option<&Product>, mut remote: Product) -> MergeOutcome<Product> {
    if !decide(local.map(|p| p.synced), false).applies() {
        return MergeOutcome::Keep;
    }
    if let Some(local) = local {
        remote.id = local.id;
    }
    remote.synced = true;
    MergeOutcome::Apply(remote)
}

pub fn merge_expense(local: Option<&Expense>, mut remote: Expense) -> MergeOutcome<Expense> {
    if !decide(local.map(|e| e.synced), false).applies() {
        return MergeOutcome::Keep;
    }
    if let Some(local) = local {
        remote.id = local.id;
        remote.salesperson_id = remote.salesperson_id.or(local.salesperson_id);
    }
    remote.synced = true;
    MergeOutcome::Apply(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kicks_core::{GeoPoint, PaymentMethod};

    fn sale(id: i64, synced: bool, refunded: bool) -> Sale {
        Sale {
            id,
            timestamp: Utc::now(),
            items: vec![],
            total_cents: 5000,
            shipping_cost_cents: 0,
            salesperson_id: Some(2),
            salesperson_name: "Luis".into(),
            payment_method: PaymentMethod::Cash,
            location: Some(GeoPoint { lat: 19.4, lng: -99.1 }),
            layaway_id: None,
            refunded,
            synced,
        }
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(decide(None, false), MergeDecision::Insert);
        assert_eq!(decide(Some(true), false), MergeDecision::Replace);
        assert_eq!(decide(Some(false), false), MergeDecision::KeepLocal);
        assert_eq!(decide(Some(false), true), MergeDecision::Replace);
    }

    #[test]
    fn test_unsynced_sale_kept_against_plain_remote() {
        let local = sale(10, false, false);
        let mut remote = sale(0, true, false);
        remote.total_cents = 9999;
        assert_eq!(merge_sale(Some(&local), remote), MergeOutcome::Keep);
    }

    #[test]
    fn test_refunded_remote_overrides_unsynced_local() {
        let local = sale(10, false, false);
        let mut remote = sale(0, false, true);
        remote.salesperson_id = None;
        remote.location = None;

        let MergeOutcome::Apply(merged) = merge_sale(Some(&local), remote) else {
            panic!("refund must win");
        };
        assert_eq!(merged.id, 10);
        assert!(merged.refunded);
        assert!(merged.synced);
        // Local-only fields survive
        assert_eq!(merged.salesperson_id, Some(2));
        assert!(merged.location.is_some());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let remote = sale(0, true, false);
        let MergeOutcome::Apply(first) = merge_sale(None, remote.clone()) else {
            panic!("insert expected");
        };
        let stored = Sale { id: 5, ..first };
        let MergeOutcome::Apply(second) = merge_sale(Some(&stored), remote) else {
            panic!("synced local must be replaced");
        };
        assert_eq!(second, stored);
    }

    #[test]
    fn test_unsynced_product_kept() {
        let local = Product {
            id: 4,
            name: "Blazer Mid 42".into(),
            price_cents: 9000,
            category: None,
            brand: None,
            size: None,
            image: None,
            stock: 2,
            synced: false,
        };
        let remote = Product {
            id: 0,
            stock: 7,
            synced: true,
            ..local.clone()
        };
        assert_eq!(merge_product(Some(&local), remote.clone()), MergeOutcome::Keep);

        let synced_local = Product { synced: true, ..local };
        let MergeOutcome::Apply(merged) = merge_product(Some(&synced_local), remote) else {
            panic!("synced local must be replaced");
        };
        assert_eq!((merged.id, merged.stock), (4, 7));
    }
}
