//! Cost of goods sold breakdown models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::{checked_product, try_sum, AmountOverflow};

/// Quantity and cost a single batch contributed to a sale line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostDetail {
    pub id: Uuid,
    pub sale_line_id: Uuid,
    pub batch_id: Uuid,
    pub material_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub created_at: DateTime<Utc>,
}

impl CostDetail {
    pub fn total_cost(&self) -> Result<Decimal, AmountOverflow> {
        checked_product(self.quantity, self.unit_cost, "total_cost")
    }
}

/// Realized cost of goods sold across a sale line's cost details
pub fn realized_cost(details: &[CostDetail]) -> Result<Decimal, AmountOverflow> {
    try_sum(details.iter().map(CostDetail::total_cost), "realized_cost")
}

/// Result of a consumption, returned to the sale workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionResult {
    pub material_id: Uuid,
    pub sale_line_id: Uuid,
    pub quantity: Decimal,
    pub cost_details: Vec<CostDetail>,
    pub realized_cost: Decimal,
}
