//! In-process ledger store
//!
//! Committed state lives behind a single `RwLock`. Writers are serialized per
//! material by a lock table of async mutexes; a transaction works on a private
//! copy of its material's batches and publishes it only on commit. Sale line
//! claims are store-wide so one sale line is consumed once across materials.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use shared::{
    checked_sum, fifo_order, select_expiring, CostDetail, Material, MovementRecord, NewMovement,
    StockBatch,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, LedgerTransaction, NewBatch};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    materials: HashMap<Uuid, Material>,
    batches: HashMap<Uuid, Vec<StockBatch>>,
    movements: Vec<MovementRecord>,
    cost_details: Vec<CostDetail>,
}

#[derive(Default)]
struct Sequences {
    batch: AtomicI64,
    movement: AtomicI64,
}

impl Sequences {
    fn next_batch(&self) -> i64 {
        self.batch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_movement(&self) -> i64 {
        self.movement.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Ledger store kept in process memory
#[derive(Clone)]
pub struct MemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
    sale_lines: Arc<Mutex<HashSet<Uuid>>>,
    sequences: Arc<Sequences>,
    lock_timeout: Duration,
}

impl MemoryLedgerStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            sale_lines: Arc::new(Mutex::new(HashSet::new())),
            sequences: Arc::new(Sequences::default()),
            lock_timeout,
        }
    }

    fn material_lock(&self, material_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(material_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_material(&self, material: &Material) -> AppResult<()> {
        let mut tables = self.tables.write();
        if tables.materials.contains_key(&material.id) {
            return Err(AppError::validation("id", "Material already exists"));
        }
        tables.materials.insert(material.id, material.clone());
        Ok(())
    }

    async fn get_material(&self, material_id: Uuid) -> AppResult<Option<Material>> {
        Ok(self.tables.read().materials.get(&material_id).cloned())
    }

    async fn begin(&self, material_id: Uuid) -> AppResult<Box<dyn LedgerTransaction>> {
        if !self.tables.read().materials.contains_key(&material_id) {
            return Err(AppError::NotFound("Material".to_string()));
        }

        let lock = self.material_lock(material_id);
        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                AppError::ConflictRetryable(format!(
                    "timed out waiting for lock on material {}",
                    material_id
                ))
            })?;

        let (material, batches) = {
            let tables = self.tables.read();
            let material = tables
                .materials
                .get(&material_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound("Material".to_string()))?;
            let batches = tables.batches.get(&material_id).cloned().unwrap_or_default();
            (material, batches)
        };

        Ok(Box::new(MemoryTransaction {
            guard,
            tables: self.tables.clone(),
            sale_lines: self.sale_lines.clone(),
            sequences: self.sequences.clone(),
            material,
            batches,
            movements: Vec::new(),
            cost_details: Vec::new(),
            claims: Vec::new(),
        }))
    }

    async fn list_batches(&self, material_id: Uuid) -> AppResult<Vec<StockBatch>> {
        let mut batches = self
            .tables
            .read()
            .batches
            .get(&material_id)
            .cloned()
            .unwrap_or_default();
        batches.sort_by(fifo_order);
        Ok(batches)
    }

    async fn expiring_batches(&self, from: NaiveDate, until: NaiveDate) -> AppResult<Vec<StockBatch>> {
        let tables = self.tables.read();
        Ok(select_expiring(tables.batches.values().flatten(), from, until))
    }

    async fn list_movements(&self, material_id: Uuid) -> AppResult<Vec<MovementRecord>> {
        let mut movements: Vec<MovementRecord> = self
            .tables
            .read()
            .movements
            .iter()
            .filter(|m| m.material_id == material_id)
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.sequence);
        Ok(movements)
    }

    async fn cost_details_for_sale_line(&self, sale_line_id: Uuid) -> AppResult<Vec<CostDetail>> {
        Ok(self
            .tables
            .read()
            .cost_details
            .iter()
            .filter(|d| d.sale_line_id == sale_line_id)
            .cloned()
            .collect())
    }

    async fn delete_sale_line_cost_details(&self, sale_line_id: Uuid) -> AppResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.cost_details.len();
        tables.cost_details.retain(|d| d.sale_line_id != sale_line_id);
        Ok((before - tables.cost_details.len()) as u64)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Sale line reserved by an open transaction, released on drop unless kept
struct SaleLineClaim {
    sale_lines: Arc<Mutex<HashSet<Uuid>>>,
    sale_line_id: Uuid,
    kept: bool,
}

impl SaleLineClaim {
    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for SaleLineClaim {
    fn drop(&mut self) {
        if !self.kept {
            self.sale_lines.lock().remove(&self.sale_line_id);
        }
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<()>,
    tables: Arc<RwLock<Tables>>,
    sale_lines: Arc<Mutex<HashSet<Uuid>>>,
    sequences: Arc<Sequences>,
    material: Material,
    /// Working copy of every batch of the locked material
    batches: Vec<StockBatch>,
    movements: Vec<MovementRecord>,
    cost_details: Vec<CostDetail>,
    claims: Vec<SaleLineClaim>,
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    fn material(&self) -> &Material {
        &self.material
    }

    async fn available_batches(&mut self) -> AppResult<Vec<StockBatch>> {
        let mut available: Vec<StockBatch> =
            self.batches.iter().filter(|b| b.is_available()).cloned().collect();
        available.sort_by(fifo_order);
        Ok(available)
    }

    async fn claim_sale_line(&mut self, sale_line_id: Uuid) -> AppResult<bool> {
        if !self.sale_lines.lock().insert(sale_line_id) {
            return Ok(false);
        }
        self.claims.push(SaleLineClaim {
            sale_lines: self.sale_lines.clone(),
            sale_line_id,
            kept: false,
        });
        Ok(true)
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<StockBatch> {
        let created = StockBatch {
            id: Uuid::new_v4(),
            material_id: batch.material_id,
            receipt_date: batch.receipt_date,
            sequence: self.sequences.next_batch(),
            initial_quantity: batch.quantity,
            remaining_quantity: batch.quantity,
            unit_cost: batch.unit_cost,
            expiry_date: batch.expiry_date,
            lot_label: batch.lot_label,
            source_reference: batch.source_reference,
            created_at: Utc::now(),
        };
        self.batches.push(created.clone());
        Ok(created)
    }

    async fn set_batch_remaining(&mut self, batch_id: Uuid, remaining: Decimal) -> AppResult<()> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        if remaining < Decimal::ZERO || remaining > batch.initial_quantity {
            return Err(AppError::StorageFailure(format!(
                "remaining quantity {} out of range for batch {}",
                remaining, batch_id
            )));
        }
        batch.remaining_quantity = remaining;
        Ok(())
    }

    async fn insert_cost_detail(&mut self, detail: &CostDetail) -> AppResult<()> {
        self.cost_details.push(detail.clone());
        Ok(())
    }

    async fn append_movement(&mut self, movement: NewMovement) -> AppResult<MovementRecord> {
        let record = MovementRecord {
            id: Uuid::new_v4(),
            sequence: self.sequences.next_movement(),
            material_id: movement.material_id,
            direction: movement.direction,
            quantity: movement.quantity,
            unit_price: movement.unit_price,
            reference_kind: movement.reference_kind,
            reference_id: movement.reference_id,
            occurred_at: movement.occurred_at,
        };
        self.movements.push(record.clone());
        Ok(record)
    }

    async fn recompute_on_hand(&mut self) -> AppResult<Decimal> {
        let on_hand = checked_sum(
            self.batches.iter().map(|b| b.remaining_quantity),
            "on_hand_quantity",
        )?;
        self.material.on_hand_quantity = on_hand;
        self.material.updated_at = Utc::now();
        Ok(on_hand)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        let mut tables = this.tables.write();
        let material_id = this.material.id;
        tables.batches.insert(material_id, this.batches);
        tables.movements.extend(this.movements);
        tables.cost_details.extend(this.cost_details);
        tables.materials.insert(material_id, this.material);
        for claim in this.claims {
            claim.keep();
        }
        // Guard is released after the tables are published.
        drop(tables);
        drop(this.guard);
        Ok(())
    }
}
