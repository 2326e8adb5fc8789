//! Material catalog models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A construction material tracked by the ledger.
///
/// `on_hand_quantity` is a cache over the material's batches and is only ever
/// written by a full recomputation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub id: Uuid,
    pub name: String,
    /// Unit of measure, e.g. "m3", "bag", "ton"
    pub unit_of_measure: String,
    pub on_hand_quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    pub fn new(name: impl Into<String>, unit_of_measure: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            unit_of_measure: unit_of_measure.into(),
            on_hand_quantity: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}
