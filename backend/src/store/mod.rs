//! Persistence for batches, movements and cost details
//!
//! A [`LedgerStore`] hands out one [`LedgerTransaction`] per receive/consume.
//! Opening a transaction takes the material's lock, so writers on the same
//! material are serialized while different materials proceed in parallel.
//! Nothing a transaction writes is visible until `commit`; dropping it rolls
//! everything back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{CostDetail, Material, MovementRecord, NewMovement, StockBatch};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// A batch that has not been persisted yet
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub material_id: Uuid,
    pub receipt_date: DateTime<Utc>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub expiry_date: Option<NaiveDate>,
    pub lot_label: Option<String>,
    pub source_reference: Option<Uuid>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Register a material in the catalog
    async fn insert_material(&self, material: &Material) -> AppResult<()>;

    async fn get_material(&self, material_id: Uuid) -> AppResult<Option<Material>>;

    /// Open a transaction scoped to one material, waiting for its lock.
    ///
    /// Fails with `NotFound` when the material does not exist and with
    /// `ConflictRetryable` when the lock cannot be taken in time.
    async fn begin(&self, material_id: Uuid) -> AppResult<Box<dyn LedgerTransaction>>;

    /// Every batch of a material, exhausted ones included
    async fn list_batches(&self, material_id: Uuid) -> AppResult<Vec<StockBatch>>;

    /// Available batches of any material expiring within `[from, until]`
    async fn expiring_batches(&self, from: NaiveDate, until: NaiveDate) -> AppResult<Vec<StockBatch>>;

    /// Movement log of a material in append order
    async fn list_movements(&self, material_id: Uuid) -> AppResult<Vec<MovementRecord>>;

    async fn cost_details_for_sale_line(&self, sale_line_id: Uuid) -> AppResult<Vec<CostDetail>>;

    /// Remove the cost details of a deleted sale line, returning how many went
    async fn delete_sale_line_cost_details(&self, sale_line_id: Uuid) -> AppResult<u64>;

    /// Connectivity probe used by the health check
    async fn ping(&self) -> AppResult<()>;
}

/// Unit of work over a single locked material
#[async_trait]
pub trait LedgerTransaction: Send {
    /// The material as read when the lock was taken
    fn material(&self) -> &Material;

    /// Batches with remaining stock, oldest receipt first, ties by sequence
    async fn available_batches(&mut self) -> AppResult<Vec<StockBatch>>;

    /// Reserve a sale line for this consumption.
    ///
    /// Returns `false` when the sale line was already consumed, on any
    /// material. Claims are store-wide and survive a purge of the sale line's
    /// cost details; a rolled-back transaction releases its claim.
    async fn claim_sale_line(&mut self, sale_line_id: Uuid) -> AppResult<bool>;

    /// Create a batch; the store assigns its id and sequence number
    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<StockBatch>;

    async fn set_batch_remaining(&mut self, batch_id: Uuid, remaining: Decimal) -> AppResult<()>;

    async fn insert_cost_detail(&mut self, detail: &CostDetail) -> AppResult<()>;

    async fn append_movement(&mut self, movement: NewMovement) -> AppResult<MovementRecord>;

    /// Re-sum the material's batches into its cached on-hand quantity
    async fn recompute_on_hand(&mut self) -> AppResult<Decimal>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
