//! Stock status and reconciliation read models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StockBatch;
use crate::amount::AmountOverflow;

/// Scale used when reporting averaged costs
pub const AVERAGE_COST_SCALE: u32 = 4;

/// Point-in-time stock status for a material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockStatus {
    pub material_id: Uuid,
    pub on_hand_quantity: Decimal,
    pub total_value: Decimal,
    pub weighted_average_cost: Decimal,
    pub min_unit_cost: Decimal,
    pub max_unit_cost: Decimal,
    pub active_batch_count: u32,
}

impl StockStatus {
    pub fn empty(material_id: Uuid) -> Self {
        Self {
            material_id,
            on_hand_quantity: Decimal::ZERO,
            total_value: Decimal::ZERO,
            weighted_average_cost: Decimal::ZERO,
            min_unit_cost: Decimal::ZERO,
            max_unit_cost: Decimal::ZERO,
            active_batch_count: 0,
        }
    }

    /// Fold a material's batches into a status. Exhausted batches are ignored.
    pub fn from_batches(material_id: Uuid, batches: &[StockBatch]) -> Result<Self, AmountOverflow> {
        let mut status = Self::empty(material_id);
        let mut min_cost: Option<Decimal> = None;
        let mut max_cost: Option<Decimal> = None;

        for batch in batches.iter().filter(|b| b.is_available()) {
            status.on_hand_quantity = status
                .on_hand_quantity
                .checked_add(batch.remaining_quantity)
                .ok_or(AmountOverflow("on_hand_quantity"))?;
            status.total_value = status
                .total_value
                .checked_add(batch.value()?)
                .ok_or(AmountOverflow("total_value"))?;
            status.active_batch_count += 1;
            min_cost = Some(min_cost.map_or(batch.unit_cost, |c| c.min(batch.unit_cost)));
            max_cost = Some(max_cost.map_or(batch.unit_cost, |c| c.max(batch.unit_cost)));
        }

        if status.on_hand_quantity > Decimal::ZERO {
            status.weighted_average_cost = status
                .total_value
                .checked_div(status.on_hand_quantity)
                .ok_or(AmountOverflow("weighted_average_cost"))?
                .round_dp(AVERAGE_COST_SCALE);
        }
        status.min_unit_cost = min_cost.unwrap_or(Decimal::ZERO);
        status.max_unit_cost = max_cost.unwrap_or(Decimal::ZERO);
        Ok(status)
    }
}

/// Three-way comparison of the movement log, batch state and cached aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationReport {
    pub material_id: Uuid,
    /// sum(IN) - sum(OUT) over the movement log
    pub movement_net: Decimal,
    /// sum(remaining) over all batches
    pub batch_remaining: Decimal,
    /// Cached on-hand quantity on the material
    pub cached_on_hand: Decimal,
    pub balanced: bool,
}

impl ReconciliationReport {
    pub fn new(
        material_id: Uuid,
        movement_net: Decimal,
        batch_remaining: Decimal,
        cached_on_hand: Decimal,
    ) -> Self {
        Self {
            material_id,
            movement_net,
            batch_remaining,
            cached_on_hand,
            balanced: movement_net == batch_remaining && batch_remaining == cached_on_hand,
        }
    }
}
