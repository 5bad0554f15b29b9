//! # Layaway Math
//!
//! Balance and status rules for installment sales.
//!
//! ## Lifecycle
//! ```text
//!                 ┌──────────── add payment (balance > 1¢) ───┐
//!                 │                                            │
//!                 ▼                                            │
//!  create ──► ┌─────────┐ ── add payment (balance <= 1¢) ──► ┌───────────┐
//!             │ pending │                                     │ completed │
//!             └────┬────┘                                     └───────────┘
//!                  │ cancel (stock goes back to the shelf)
//!                  ▼
//!             ┌───────────┐
//!             │ cancelled │
//!             └───────────┘
//! ```
//!
//! The stock side of create/cancel lives in the inventory ledger; this module
//! only keeps the money straight.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Layaway, LayawayPayment, LayawayStatus, SaleItem};
use crate::validation::{validate_cart_size, validate_customer_name, validate_payment_amount, validate_quantity};
use crate::SETTLE_TOLERANCE_CENTS;

/// `total - Σ payments`.
pub fn balance_for(total_cents: i64, payments: &[LayawayPayment]) -> i64 {
    let paid: Money = payments
        .iter()
        .map(|p| Money::from_cents(p.amount_cents))
        .sum();
    (Money::from_cents(total_cents) - paid).cents()
}

/// Status implied by an outstanding balance on an open layaway.
pub fn status_for(balance_cents: i64) -> LayawayStatus {
    if Money::from_cents(balance_cents).is_settled(SETTLE_TOLERANCE_CENTS) {
        LayawayStatus::Completed
    } else {
        LayawayStatus::Pending
    }
}

/// Validated, not yet persisted layaway.
///
/// The id is assigned by the Local Store.
pub fn open(
    customer_name: &str,
    customer_contact: Option<String>,
    items: Vec<SaleItem>,
    now: DateTime<Utc>,
) -> CoreResult<Layaway> {
    validate_customer_name(customer_name)?;
    if items.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    validate_cart_size(items.len())?;
    for item in &items {
        validate_quantity(item.quantity)?;
    }

    let total: Money = items.iter().map(SaleItem::line_total).sum();

    Ok(Layaway {
        id: 0,
        customer_name: customer_name.trim().to_string(),
        customer_contact: customer_contact
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        items,
        total_cents: total.cents(),
        balance_cents: total.cents(),
        payments: Vec::new(),
        status: LayawayStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

/// Records an installment and recomputes balance and status.
///
/// ## Errors
/// - `LayawayClosed` when the layaway is completed or cancelled
/// - `Validation` for a non-positive amount
/// - `Overpayment` when the amount exceeds the outstanding balance
pub fn apply_payment(layaway: &mut Layaway, payment: LayawayPayment) -> CoreResult<()> {
    ensure_open(layaway)?;
    validate_payment_amount(payment.amount_cents)?;

    if payment.amount_cents > layaway.balance_cents {
        return Err(CoreError::Overpayment {
            balance: layaway.balance_cents,
            attempted: payment.amount_cents,
        });
    }

    layaway.updated_at = payment.date;
    layaway.payments.push(payment);
    layaway.balance_cents = balance_for(layaway.total_cents, &layaway.payments);
    layaway.status = status_for(layaway.balance_cents);

    Ok(())
}

/// Marks an open layaway cancelled. Payments are kept for the audit trail.
pub fn cancel(layaway: &mut Layaway, now: DateTime<Utc>) -> CoreResult<()> {
    ensure_open(layaway)?;
    layaway.status = LayawayStatus::Cancelled;
    layaway.updated_at = now;
    Ok(())
}

fn ensure_open(layaway: &Layaway) -> CoreResult<()> {
    if layaway.is_open() {
        Ok(())
    } else {
        Err(CoreError::LayawayClosed {
            layaway_id: layaway.id,
            status: layaway.status,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
