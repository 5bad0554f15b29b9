//! # kicks-core: Pure Business Logic for Kicks POS
//!
//! Everything the till knows about sneakers, money and stock that does not
//! need a database or a network socket lives here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kicks POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/till (daemon)                           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        kicks-pos (checkout, kardex, layaways, dashboard)        │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────┐  ┌────────────▼────────────────────┐  │
//! │  │  kicks-db (Local Store)     │  │  kicks-sync (push/pull/realtime)│  │
//! │  └──────────────┬──────────────┘  └────────────┬────────────────────┘  │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────────────────────▼───────────────────┐   │
//! │  │               ★ kicks-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │ ledger  │ │ layaway │ │ reports │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Layaway, StockMovement, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`ledger`] - Kardex math: zero-floor clamping and replay
//! - [`layaway`] - Installment balance and status transitions
//! - [`reports`] - Dashboard aggregates
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use kicks_core::ledger::StockChange;
//!
//! // Selling 5 pairs when only 2 are on the shelf sells to zero.
//! let change = StockChange::compute(2, -5);
//! assert_eq!(change.new_stock, 0);
//! assert_eq!(change.delta, -5);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod layaway;
pub mod ledger;
pub mod money;
pub mod reports;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single line in a cart or layaway.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum distinct lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// A layaway balance at or below this many cents counts as paid off.
pub const SETTLE_TOLERANCE_CENTS: i64 = 1;
