//! First-in-first-out allocation over stock batches
//!
//! The planner is pure: it reads a snapshot of a material's batches and
//! decides which batches fund a requested quantity. Persisting the plan is the
//! caller's job, which lets the backend run it inside a locked transaction and
//! the WASM client run it for previews.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::amount::{checked_product, checked_sum, try_sum, AmountOverflow};
use crate::models::{fifo_order, StockBatch};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FifoError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),

    #[error("insufficient stock: requested {requested}, available {available}")]
    Insufficient {
        requested: Decimal,
        available: Decimal,
    },

    #[error(transparent)]
    Overflow(#[from] AmountOverflow),
}

/// Quantity drawn from a single batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAllocation {
    pub batch_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// Batch remaining quantity once this allocation is applied
    pub remaining_after: Decimal,
}

impl BatchAllocation {
    pub fn total_cost(&self) -> Result<Decimal, AmountOverflow> {
        checked_product(self.quantity, self.unit_cost, "total_cost")
    }
}

/// Ordered set of allocations that exactly covers a requested quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPlan {
    pub requested: Decimal,
    pub allocations: Vec<BatchAllocation>,
}

impl ConsumptionPlan {
    pub fn total_cost(&self) -> Result<Decimal, AmountOverflow> {
        try_sum(self.allocations.iter().map(BatchAllocation::total_cost), "total_cost")
    }

    pub fn allocated_quantity(&self) -> Result<Decimal, AmountOverflow> {
        checked_sum(self.allocations.iter().map(|a| a.quantity), "quantity")
    }
}

/// Batches with remaining stock, in FIFO order
pub fn available_in_fifo_order(batches: &[StockBatch]) -> Vec<&StockBatch> {
    let mut available: Vec<&StockBatch> = batches.iter().filter(|b| b.is_available()).collect();
    available.sort_by(|a, b| fifo_order(a, b));
    available
}

/// Total remaining quantity across available batches
pub fn available_quantity(batches: &[StockBatch]) -> Result<Decimal, AmountOverflow> {
    checked_sum(
        batches
            .iter()
            .filter(|b| b.is_available())
            .map(|b| b.remaining_quantity),
        "available_quantity",
    )
}

/// Plan the consumption of `quantity` units, oldest batch first.
///
/// Sufficiency is checked against the sum of all available batches before any
/// allocation is produced, so an error never carries a partial plan.
pub fn plan_consumption(
    batches: &[StockBatch],
    quantity: Decimal,
) -> Result<ConsumptionPlan, FifoError> {
    if quantity <= Decimal::ZERO {
        return Err(FifoError::InvalidQuantity(quantity));
    }

    let available = available_quantity(batches)?;
    if available < quantity {
        return Err(FifoError::Insufficient {
            requested: quantity,
            available,
        });
    }

    let mut needed = quantity;
    let mut allocations = Vec::new();

    for batch in available_in_fifo_order(batches) {
        if needed.is_zero() {
            break;
        }
        let take = needed.min(batch.remaining_quantity);
        allocations.push(BatchAllocation {
            batch_id: batch.id,
            quantity: take,
            unit_cost: batch.unit_cost,
            remaining_after: batch.remaining_quantity - take,
        });
        needed -= take;
    }

    Ok(ConsumptionPlan {
        requested: quantity,
        allocations,
    })
}
