//! # Validation Module
//!
//! Input validation for till operations. Every check here runs before any
//! state mutation, so a rejected input leaves the Local Store untouched.
//!
//! ## Usage
//! ```rust
//! use kicks_core::validation::{validate_pin, validate_quantity};
//!
//! assert!(validate_pin("0420").is_ok());
//! assert!(validate_pin("42a0").is_err());
//! assert!(validate_quantity(2).is_ok());
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Exact length of a login PIN.
pub const PIN_LENGTH: usize = 4;

// =============================================================================
// String Validators
// =============================================================================

fn require_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a login PIN.
///
/// ## Rules
/// - Exactly 4 characters
/// - ASCII digits only
///
/// ## Login Flow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Keypad input: "04a"                                                    │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_pin ← THIS FUNCTION                                           │
/// │       │                                                                 │
/// │       ├── empty?         → Required                                     │
/// │       ├── not digits?    → InvalidFormat                                │
/// │       ├── len != 4?      → TooShort / TooLong                           │
/// │       └── OK → look up user by PIN                                      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_pin(pin: &str) -> ValidationResult<()> {
    if pin.is_empty() {
        return Err(ValidationError::Required {
            field: "pin".to_string(),
        });
    }

    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "pin".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    if pin.len() < PIN_LENGTH {
        return Err(ValidationError::TooShort {
            field: "pin".to_string(),
            min: PIN_LENGTH,
        });
    }

    if pin.len() > PIN_LENGTH {
        return Err(ValidationError::TooLong {
            field: "pin".to_string(),
            max: PIN_LENGTH,
        });
    }

    Ok(())
}

/// Validates a user's display name (1-60 characters).
pub fn validate_user_name(name: &str) -> ValidationResult<()> {
    require_text("name", name, 60)
}

/// Validates a product name (1-200 characters).
///
/// ## Example
/// ```rust
/// use kicks_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Samba OG").is_ok());
/// assert!(validate_product_name("  ").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    require_text("name", name, 200)
}

/// Validates an expense description (1-500 characters).
pub fn validate_description(description: &str) -> ValidationResult<()> {
    require_text("description", description, 500)
}

/// Validates a layaway customer name (1-120 characters).
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    require_text("customer name", name, 120)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (giveaways).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a shipping charge in cents. Zero means pickup.
pub fn validate_shipping_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "shipping cost".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates an absolute stock count.
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a non-zero stock delta.
pub fn validate_stock_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: "stock change cannot be zero".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount in cents (> 0).
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an expense amount in cents (> 0).
pub fn validate_expense_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size (number of distinct lines).
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("0000").is_ok());
        assert!(validate_pin("1234").is_ok());

        assert!(matches!(validate_pin(""), Err(ValidationError::Required { .. })));
        assert!(matches!(
            validate_pin("12a4"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(validate_pin("123"), Err(ValidationError::TooShort { .. })));
        assert!(matches!(validate_pin("12345"), Err(ValidationError::TooLong { .. })));
        // Non-ASCII digits are rejected too
        assert!(validate_pin("١٢٣٤").is_err());
    }

    #[test]
    fn test_validate_names() {
        assert!(validate_product_name("Jordan 1 Mid").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
        assert!(validate_user_name("Ana").is_ok());
        assert!(validate_customer_name("   ").is_err());
        assert!(validate_description("Shoe boxes").is_ok());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_shipping_cents(0).is_ok());
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_expense_amount(150).is_ok());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-2).is_err());
        assert!(validate_stock_delta(0).is_err());
        assert!(validate_stock_delta(-3).is_ok());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS + 1).is_err());
    }
}
