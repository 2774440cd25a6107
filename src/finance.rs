//! Money input validation.

use crate::{Error, Result};

/// Parse a user-entered amount.
///
/// Accepts an optional leading `$`, comma thousands separators and surrounding
/// whitespace. Rejects negative and non-finite values.
pub fn parse_amount(input: &str) -> Result<f64> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(Error::InvalidInput("amount is required".to_string()));
    }
    let value: f64 = cleaned
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid amount '{}'", input.trim())))?;
    if !value.is_finite() {
        return Err(Error::InvalidInput(format!("invalid amount '{}'", input.trim())));
    }
    if value < 0.0 {
        return Err(Error::InvalidInput("amount cannot be negative".to_string()));
    }
    Ok(value)
}

/// Subtotal minus `discount`, rejecting discounts larger than the subtotal.
pub fn apply_discount(subtotal: f64, discount: f64) -> Result<f64> {
    if !subtotal.is_finite() || !discount.is_finite() || discount < 0.0 {
        return Err(Error::InvalidInput("discount must be a non-negative number".to_string()));
    }
    if discount > subtotal {
        return Err(Error::InvalidInput(format!(
            "discount {:.2} exceeds subtotal {:.2}",
            discount, subtotal
        )));
    }
    Ok(subtotal - discount)
}
