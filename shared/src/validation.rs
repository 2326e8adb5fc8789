//! Input validation for ledger operations
//!
//! Each check returns a static message; the backend attaches the field name
//! and turns failures into `InvalidArgument` errors.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Longest accepted lot label
pub const MAX_LOT_LABEL_LEN: usize = 64;

/// Longest accepted expiry look-ahead window, in days
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 3650;

/// Decimal places stored for quantities and costs
pub const MAX_DECIMAL_SCALE: u32 = 6;

/// Exclusive upper bound for a single quantity or unit cost (10^14).
///
/// Matches the `NUMERIC(20, 6)` columns and keeps any quantity times unit
/// cost inside `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_4000, 0x5AF3, 0, false, 0);

fn exceeds_scale(value: Decimal) -> bool {
    value.normalize().scale() > MAX_DECIMAL_SCALE
}

/// Validate a received or consumed quantity
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    if quantity >= MAX_AMOUNT {
        return Err("Quantity is too large");
    }
    if exceeds_scale(quantity) {
        return Err("Quantity cannot have more than 6 decimal places");
    }
    Ok(())
}

/// Validate a unit cost fixed at receipt (zero-cost stock is allowed)
pub fn validate_unit_cost(unit_cost: Decimal) -> Result<(), &'static str> {
    if unit_cost < Decimal::ZERO {
        return Err("Unit cost cannot be negative");
    }
    if unit_cost >= MAX_AMOUNT {
        return Err("Unit cost is too large");
    }
    if exceeds_scale(unit_cost) {
        return Err("Unit cost cannot have more than 6 decimal places");
    }
    Ok(())
}

/// Validate that an expiry date does not precede the receipt date
pub fn validate_expiry_date(
    receipt_date: DateTime<Utc>,
    expiry_date: Option<NaiveDate>,
) -> Result<(), &'static str> {
    match expiry_date {
        Some(expiry) if expiry < receipt_date.date_naive() => {
            Err("Expiry date cannot be before the receipt date")
        }
        _ => Ok(()),
    }
}

/// Validate an optional lot label
pub fn validate_lot_label(label: Option<&str>) -> Result<(), &'static str> {
    match label {
        Some(l) if l.trim().is_empty() => Err("Lot label cannot be blank"),
        Some(l) if l.len() > MAX_LOT_LABEL_LEN => Err("Lot label is too long"),
        _ => Ok(()),
    }
}

/// Validate the look-ahead window of an expiring-batches query
pub fn validate_expiry_window(days: i64) -> Result<(), &'static str> {
    if days < 0 {
        return Err("Expiry window cannot be negative");
    }
    if days > MAX_EXPIRY_WINDOW_DAYS {
        return Err("Expiry window is too large");
    }
    Ok(())
}

/// Validate a material name
pub fn validate_material_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Material name is required");
    }
    if trimmed.len() > 200 {
        return Err("Material name must be at most 200 characters");
    }
    Ok(())
}

/// Validate a unit of measure code (e.g. "m3", "bag", "kg")
pub fn validate_unit_of_measure(unit: &str) -> Result<(), &'static str> {
    if unit.is_empty() || unit.len() > 16 {
        return Err("Unit of measure must be 1-16 characters");
    }
    if !unit.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/') {
        return Err("Unit of measure must be alphanumeric");
    }
    Ok(())
}
