//! All-or-nothing tests
//!
//! A store wrapper injects a storage failure at a chosen step of the
//! transaction; the ledger must come back exactly as it was before the call.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{at, dec, receipt, sale};
use material_ledger_backend::services::material::CreateMaterialInput;
use material_ledger_backend::services::{LedgerService, MaterialService};
use material_ledger_backend::store::{LedgerStore, LedgerTransaction, MemoryLedgerStore, NewBatch};
use material_ledger_backend::{AppError, AppResult};
use rust_decimal::Decimal;
use shared::{CostDetail, Material, MovementRecord, NewMovement, StockBatch};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
enum FailAt {
    Nothing,
    InsertBatch,
    /// Fail the n-th batch decrement (1-based)
    SetRemaining(usize),
    CostDetail,
    Movement,
    Recompute,
    Commit,
}

struct FaultyStore {
    inner: MemoryLedgerStore,
    fail_at: parking_lot::Mutex<FailAt>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: MemoryLedgerStore::default(),
            fail_at: parking_lot::Mutex::new(FailAt::Nothing),
        }
    }

    fn fail_at(&self, step: FailAt) {
        *self.fail_at.lock() = step;
    }
}

fn injected() -> AppError {
    AppError::StorageFailure("injected failure".to_string())
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn insert_material(&self, material: &Material) -> AppResult<()> {
        self.inner.insert_material(material).await
    }

    async fn get_material(&self, material_id: Uuid) -> AppResult<Option<Material>> {
        self.inner.get_material(material_id).await
    }

    async fn begin(&self, material_id: Uuid) -> AppResult<Box<dyn LedgerTransaction>> {
        let inner = self.inner.begin(material_id).await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            fail_at: *self.fail_at.lock(),
            decrements: 0,
        }))
    }

    async fn list_batches(&self, material_id: Uuid) -> AppResult<Vec<StockBatch>> {
        self.inner.list_batches(material_id).await
    }

    async fn expiring_batches(&self, from: NaiveDate, until: NaiveDate) -> AppResult<Vec<StockBatch>> {
        self.inner.expiring_batches(from, until).await
    }

    async fn list_movements(&self, material_id: Uuid) -> AppResult<Vec<MovementRecord>> {
        self.inner.list_movements(material_id).await
    }

    async fn cost_details_for_sale_line(&self, sale_line_id: Uuid) -> AppResult<Vec<CostDetail>> {
        self.inner.cost_details_for_sale_line(sale_line_id).await
    }

    async fn delete_sale_line_cost_details(&self, sale_line_id: Uuid) -> AppResult<u64> {
        self.inner.delete_sale_line_cost_details(sale_line_id).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }
}

struct FaultyTransaction {
    inner: Box<dyn LedgerTransaction>,
    fail_at: FailAt,
    decrements: usize,
}

#[async_trait]
impl LedgerTransaction for FaultyTransaction {
    fn material(&self) -> &Material {
        self.inner.material()
    }

    async fn available_batches(&mut self) -> AppResult<Vec<StockBatch>> {
        self.inner.available_batches().await
    }

    async fn claim_sale_line(&mut self, sale_line_id: Uuid) -> AppResult<bool> {
        self.inner.claim_sale_line(sale_line_id).await
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<StockBatch> {
        if self.fail_at == FailAt::InsertBatch {
            return Err(injected());
        }
        self.inner.insert_batch(batch).await
    }

    async fn set_batch_remaining(&mut self, batch_id: Uuid, remaining: Decimal) -> AppResult<()> {
        self.decrements += 1;
        if self.fail_at == FailAt::SetRemaining(self.decrements) {
            return Err(injected());
        }
        self.inner.set_batch_remaining(batch_id, remaining).await
    }

    async fn insert_cost_detail(&mut self, detail: &CostDetail) -> AppResult<()> {
        if self.fail_at == FailAt::CostDetail {
            return Err(injected());
        }
        self.inner.insert_cost_detail(detail).await
    }

    async fn append_movement(&mut self, movement: NewMovement) -> AppResult<MovementRecord> {
        if self.fail_at == FailAt::Movement {
            return Err(injected());
        }
        self.inner.append_movement(movement).await
    }

    async fn recompute_on_hand(&mut self) -> AppResult<Decimal> {
        if self.fail_at == FailAt::Recompute {
            return Err(injected());
        }
        self.inner.recompute_on_hand().await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        if self.fail_at == FailAt::Commit {
            return Err(injected());
        }
        self.inner.commit().await
    }
}

struct Fixture {
    store: Arc<FaultyStore>,
    ledger: LedgerService,
    material_id: Uuid,
}

/// Material with two batches: 50 @ 10 and 50 @ 12
async fn fixture() -> Fixture {
    let store = Arc::new(FaultyStore::new());
    let ledger = LedgerService::new(store.clone());
    let material_id = MaterialService::new(store.clone())
        .create_material(CreateMaterialInput {
            name: "Cement".to_string(),
            unit_of_measure: "bag".to_string(),
        })
        .await
        .unwrap()
        .id;

    ledger.receive(material_id, receipt("50", "10", at(2024, 1, 1))).await.unwrap();
    ledger.receive(material_id, receipt("50", "12", at(2024, 1, 5))).await.unwrap();

    Fixture {
        store,
        ledger,
        material_id,
    }
}

#[derive(Debug, PartialEq)]
struct Snapshot {
    material: Material,
    batches: Vec<StockBatch>,
    movements: Vec<MovementRecord>,
}

async fn snapshot(f: &Fixture) -> Snapshot {
    Snapshot {
        material: f.store.get_material(f.material_id).await.unwrap().unwrap(),
        batches: f.store.list_batches(f.material_id).await.unwrap(),
        movements: f.store.list_movements(f.material_id).await.unwrap(),
    }
}

#[tokio::test]
async fn test_consume_failure_at_any_step_rolls_back() {
    let steps = [
        FailAt::SetRemaining(1),
        FailAt::SetRemaining(2),
        FailAt::CostDetail,
        FailAt::Movement,
        FailAt::Recompute,
        FailAt::Commit,
    ];

    for step in steps {
        let f = fixture().await;
        let before = snapshot(&f).await;

        f.store.fail_at(step);
        let request = sale("70");
        let sale_line = request.sale_line_id;
        let err = f.ledger.consume(f.material_id, request).await.unwrap_err();

        assert!(
            matches!(err, AppError::StorageFailure(_)),
            "step {:?} returned {:?}",
            step,
            err
        );
        assert!(!err.is_user_facing());
        assert_eq!(snapshot(&f).await, before, "state changed after failure at {:?}", step);
        assert!(f.store.cost_details_for_sale_line(sale_line).await.unwrap().is_empty());

        // The failed attempt does not keep its sale line claimed
        f.store.fail_at(FailAt::Nothing);
        let mut retry = sale("70");
        retry.sale_line_id = sale_line;
        let result = f.ledger.consume(f.material_id, retry).await.unwrap();
        assert_eq!(result.realized_cost, dec("740"));
    }
}

#[tokio::test]
async fn test_receive_failure_rolls_back() {
    for step in [FailAt::InsertBatch, FailAt::Movement, FailAt::Recompute, FailAt::Commit] {
        let f = fixture().await;
        let before = snapshot(&f).await;

        f.store.fail_at(step);
        let err = f
            .ledger
            .receive(f.material_id, receipt("25", "11", at(2024, 2, 1)))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StorageFailure(_)));
        assert_eq!(snapshot(&f).await, before, "state changed after failure at {:?}", step);
    }
}

#[tokio::test]
async fn test_lock_is_released_after_failed_transaction() {
    let f = fixture().await;

    f.store.fail_at(FailAt::Movement);
    assert!(f.ledger.consume(f.material_id, sale("10")).await.is_err());

    f.store.fail_at(FailAt::Nothing);
    let result = f.ledger.consume(f.material_id, sale("70")).await.unwrap();

    assert_eq!(result.realized_cost, dec("740"));
    assert!(f.ledger.reconcile(f.material_id).await.unwrap().balanced);
}
