//! Movement log models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::{checked_product, checked_sum, AmountOverflow};

/// Direction of a stock movement. Quantities are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "in",
            MovementDirection::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementDirection::In),
            "out" => Some(MovementDirection::Out),
            _ => None,
        }
    }
}

/// Business event that caused a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    PurchaseReceipt,
    SaleLine,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::PurchaseReceipt => "purchase_receipt",
            ReferenceKind::SaleLine => "sale_line",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase_receipt" => Some(ReferenceKind::PurchaseReceipt),
            "sale_line" => Some(ReferenceKind::SaleLine),
            _ => None,
        }
    }
}

/// Immutable, append-only ledger fact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementRecord {
    pub id: Uuid,
    /// Append order within the log
    pub sequence: i64,
    pub material_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub reference_kind: ReferenceKind,
    pub reference_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl MovementRecord {
    pub fn total_price(&self) -> Result<Decimal, AmountOverflow> {
        checked_product(self.quantity, self.unit_price, "total_price")
    }

    /// Quantity with the direction applied as a sign
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}

/// A movement that has not been appended yet
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub material_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub reference_kind: ReferenceKind,
    pub reference_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Net quantity of a movement log: sum(IN) - sum(OUT)
pub fn movement_net(movements: &[MovementRecord]) -> Result<Decimal, AmountOverflow> {
    checked_sum(movements.iter().map(MovementRecord::signed_quantity), "movement_net")
}
