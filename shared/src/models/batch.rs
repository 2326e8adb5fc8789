//! Stock batch models

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::{checked_product, AmountOverflow};

/// A discrete lot of material received at one cost and one time.
///
/// Batches are never deleted. A batch whose `remaining_quantity` reaches zero
/// is exhausted and stays in the store for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockBatch {
    pub id: Uuid,
    pub material_id: Uuid,
    /// Primary FIFO key
    pub receipt_date: DateTime<Utc>,
    /// Monotonic creation sequence, secondary FIFO key for equal receipt dates
    pub sequence: i64,
    pub initial_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_cost: Decimal,
    pub expiry_date: Option<NaiveDate>,
    pub lot_label: Option<String>,
    /// Originating purchase receipt, if the purchase workflow supplied one
    pub source_reference: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl StockBatch {
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity.is_zero()
    }

    pub fn is_available(&self) -> bool {
        self.remaining_quantity > Decimal::ZERO
    }

    /// Value of the stock still held in this batch
    pub fn value(&self) -> Result<Decimal, AmountOverflow> {
        checked_product(self.remaining_quantity, self.unit_cost, "value")
    }

    pub fn consumed_quantity(&self) -> Decimal {
        self.initial_quantity - self.remaining_quantity
    }
}

/// Total FIFO order: receipt date, then creation sequence.
pub fn fifo_order(a: &StockBatch, b: &StockBatch) -> Ordering {
    a.receipt_date
        .cmp(&b.receipt_date)
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Input for receiving stock into a new batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveStockInput {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub receipt_date: DateTime<Utc>,
    pub lot_label: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub source_reference: Option<Uuid>,
}
