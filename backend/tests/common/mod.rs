//! Shared fixtures for ledger integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use material_ledger_backend::services::ledger::ConsumeStockInput;
use material_ledger_backend::services::material::CreateMaterialInput;
use material_ledger_backend::services::{LedgerService, MaterialService};
use material_ledger_backend::store::MemoryLedgerStore;
use rust_decimal::Decimal;
use shared::ReceiveStockInput;
use uuid::Uuid;

/// Helper to create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub struct Ledger {
    pub store: Arc<MemoryLedgerStore>,
    pub ledger: LedgerService,
    pub materials: MaterialService,
}

pub fn ledger() -> Ledger {
    ledger_with_timeout(Duration::from_secs(5))
}

pub fn ledger_with_timeout(lock_timeout: Duration) -> Ledger {
    let store = Arc::new(MemoryLedgerStore::new(lock_timeout));
    Ledger {
        ledger: LedgerService::new(store.clone()),
        materials: MaterialService::new(store.clone()),
        store,
    }
}

impl Ledger {
    pub async fn material(&self, name: &str) -> Uuid {
        self.materials
            .create_material(CreateMaterialInput {
                name: name.to_string(),
                unit_of_measure: "bag".to_string(),
            })
            .await
            .unwrap()
            .id
    }
}

pub fn receipt(quantity: &str, unit_cost: &str, receipt_date: DateTime<Utc>) -> ReceiveStockInput {
    ReceiveStockInput {
        quantity: dec(quantity),
        unit_cost: dec(unit_cost),
        receipt_date,
        lot_label: None,
        expiry_date: None,
        source_reference: None,
    }
}

pub fn sale(quantity: &str) -> ConsumeStockInput {
    ConsumeStockInput {
        quantity: dec(quantity),
        sale_line_id: Uuid::new_v4(),
    }
}
