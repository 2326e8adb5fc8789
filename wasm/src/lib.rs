//! WebAssembly module for the Material Ledger
//!
//! Provides client-side computation for:
//! - FIFO cost previews before a sale line is confirmed
//! - Stock status over a fetched batch list
//! - Expiry look-ahead
//! - Offline receipt validation
//!
//! All figures cross the boundary as JSON with decimals encoded as strings.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{
    expiry_window, plan_consumption, select_expiring, validate_expiry_date, validate_lot_label,
    validate_quantity, validate_unit_cost, ConsumptionPlan, ReceiveStockInput, StockBatch,
    StockStatus,
};
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("material ledger wasm loaded"));
}

fn parse_batches(batches_json: &str) -> Result<Vec<StockBatch>, String> {
    serde_json::from_str(batches_json).map_err(|e| format!("Invalid batches JSON: {}", e))
}

fn parse_decimal(value: &str, field: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|_| format!("Invalid {}: {}", field, value))
}

fn preview(batches_json: &str, quantity: &str) -> Result<ConsumptionPlan, String> {
    let batches = parse_batches(batches_json)?;
    let quantity = parse_decimal(quantity, "quantity")?;
    plan_consumption(&batches, quantity).map_err(|e| e.to_string())
}

fn status(material_id: &str, batches_json: &str) -> Result<StockStatus, String> {
    let material_id =
        Uuid::parse_str(material_id).map_err(|_| format!("Invalid material id: {}", material_id))?;
    let batches = parse_batches(batches_json)?;
    StockStatus::from_batches(material_id, &batches).map_err(|e| e.to_string())
}

fn expiring(batches_json: &str, today: NaiveDate, days: i64) -> Result<Vec<StockBatch>, String> {
    let (from, until) = expiry_window(today, days).map_err(str::to_string)?;
    let batches = parse_batches(batches_json)?;
    Ok(select_expiring(&batches, from, until))
}

fn check_receipt(input: &ReceiveStockInput) -> Vec<String> {
    let checks = [
        ("quantity", validate_quantity(input.quantity)),
        ("unit_cost", validate_unit_cost(input.unit_cost)),
        (
            "expiry_date",
            validate_expiry_date(input.receipt_date, input.expiry_date),
        ),
        ("lot_label", validate_lot_label(input.lot_label.as_deref())),
    ];

    checks
        .into_iter()
        .filter_map(|(field, result)| result.err().map(|msg| format!("{}: {}", field, msg)))
        .collect()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Preview which batches a consumption would draw from and at what cost.
///
/// Fails the same way the ledger would: a non-positive quantity or more than
/// the batches hold.
#[wasm_bindgen]
pub fn preview_fifo_cost(batches_json: &str, quantity: &str) -> Result<String, JsValue> {
    let plan = preview(batches_json, quantity).map_err(|e| JsValue::from_str(&e))?;
    to_json(&plan)
}

/// Realized cost of consuming `quantity`, as a decimal string
#[wasm_bindgen]
pub fn realized_cost_for(batches_json: &str, quantity: &str) -> Result<String, JsValue> {
    let plan = preview(batches_json, quantity).map_err(|e| JsValue::from_str(&e))?;
    let cost = plan.total_cost().map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(cost.to_string())
}

/// Stock status over a material's batch list
#[wasm_bindgen]
pub fn stock_status(material_id: &str, batches_json: &str) -> Result<String, JsValue> {
    let status = status(material_id, batches_json).map_err(|e| JsValue::from_str(&e))?;
    to_json(&status)
}

/// Batches expiring within `days` of the browser's current date
#[wasm_bindgen]
pub fn expiring_batches(batches_json: &str, days: i32) -> Result<String, JsValue> {
    let now = js_sys::Date::new_0();
    let today = NaiveDate::from_ymd_opt(
        now.get_utc_full_year() as i32,
        now.get_utc_month() + 1,
        now.get_utc_date(),
    )
    .ok_or_else(|| JsValue::from_str("Invalid system date"))?;

    let batches = expiring(batches_json, today, days as i64).map_err(|e| JsValue::from_str(&e))?;
    to_json(&batches)
}

/// Validate a receipt form; returns one message per failing field
#[wasm_bindgen]
pub fn validate_receipt(input_json: &str) -> Result<js_sys::Array, JsValue> {
    let input: ReceiveStockInput = serde_json::from_str(input_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid receipt JSON: {}", e)))?;

    Ok(check_receipt(&input)
        .into_iter()
        .map(|msg| JsValue::from_str(&msg))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn batch(day: u32, sequence: i64, remaining: Decimal, cost: Decimal) -> StockBatch {
        StockBatch {
            id: Uuid::new_v4(),
            material_id: Uuid::nil(),
            receipt_date: Utc.with_ymd_and_hms(2024, 1, day, 8, 0, 0).unwrap(),
            sequence,
            initial_quantity: remaining,
            remaining_quantity: remaining,
            unit_cost: cost,
            expiry_date: None,
            lot_label: None,
            source_reference: None,
            created_at: Utc::now(),
        }
    }

    fn cement_batches() -> String {
        serde_json::to_string(&vec![
            batch(5, 2, dec!(50), dec!(12)),
            batch(1, 1, dec!(50), dec!(10)),
        ])
        .unwrap()
    }

    #[test]
    fn test_preview_draws_oldest_first() {
        let plan = preview(&cement_batches(), "70").unwrap();

        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].unit_cost, dec!(10));
        assert_eq!(plan.allocations[0].quantity, dec!(50));
        assert_eq!(plan.allocations[1].quantity, dec!(20));
        assert_eq!(plan.total_cost(), Ok(dec!(740)));
    }

    #[test]
    fn test_preview_rejects_bad_input() {
        assert!(preview(&cement_batches(), "101").is_err());
        assert!(preview(&cement_batches(), "0").is_err());
        assert!(preview(&cement_batches(), "seventy").is_err());
        assert!(preview("not json", "1").is_err());
    }

    #[test]
    fn test_status_over_batches() {
        let id = Uuid::new_v4();
        let status = status(&id.to_string(), &cement_batches()).unwrap();

        assert_eq!(status.material_id, id);
        assert_eq!(status.on_hand_quantity, dec!(100));
        assert_eq!(status.total_value, dec!(1100));
        assert_eq!(status.weighted_average_cost, dec!(11));
        assert_eq!(status.active_batch_count, 2);
    }

    #[test]
    fn test_expiring_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut soon = batch(1, 1, dec!(5), dec!(1));
        soon.expiry_date = NaiveDate::from_ymd_opt(2024, 3, 8);
        let mut later = batch(1, 2, dec!(5), dec!(1));
        later.expiry_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let mut exhausted = batch(1, 3, dec!(0), dec!(1));
        exhausted.expiry_date = NaiveDate::from_ymd_opt(2024, 3, 2);
        let json = serde_json::to_string(&vec![later, exhausted, soon.clone()]).unwrap();

        let found = expiring(&json, today, 7).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, soon.id);
        assert!(expiring(&json, today, -1).is_err());
    }

    #[test]
    fn test_expiring_rejects_oversized_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let json = serde_json::to_string(&vec![batch(1, 1, dec!(5), dec!(1))]).unwrap();

        assert!(expiring(&json, today, i32::MAX as i64).is_err());
        assert!(expiring(&json, NaiveDate::MAX, 1).is_err());
    }

    #[test]
    fn test_status_reports_overflow() {
        let json = serde_json::to_string(&vec![
            batch(1, 1, Decimal::MAX, dec!(1)),
            batch(2, 2, Decimal::MAX, dec!(1)),
        ])
        .unwrap();

        assert!(status(&Uuid::new_v4().to_string(), &json).is_err());
    }

    #[test]
    fn test_check_receipt_collects_every_failure() {
        let input = ReceiveStockInput {
            quantity: dec!(0),
            unit_cost: dec!(-1),
            receipt_date: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
            lot_label: None,
            expiry_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            source_reference: None,
        };

        let errors = check_receipt(&input);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("quantity"));
        assert!(errors[2].starts_with("expiry_date"));
    }
}
