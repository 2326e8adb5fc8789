//! PostgreSQL ledger store
//!
//! Each ledger transaction is a database transaction that starts by locking
//! the material row with `SELECT ... FOR UPDATE`. Concurrent writers on the
//! same material queue behind that row lock; `lock_timeout` turns a long wait
//! into a retryable conflict.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    CostDetail, Material, MovementDirection, MovementRecord, NewMovement, ReferenceKind,
    StockBatch,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerStore, LedgerTransaction, NewBatch};
use crate::error::{AppError, AppResult};

const MATERIAL_COLUMNS: &str =
    "id, name, unit_of_measure, on_hand_quantity, created_at, updated_at";

const BATCH_COLUMNS: &str = "id, material_id, receipt_date, batch_sequence, initial_quantity, \
     remaining_quantity, unit_cost, expiry_date, lot_label, source_reference, created_at";

const MOVEMENT_COLUMNS: &str = "id, movement_sequence, material_id, direction, quantity, \
     unit_price, reference_kind, reference_id, occurred_at";

const COST_DETAIL_COLUMNS: &str =
    "id, sale_line_id, batch_id, material_id, quantity, unit_cost, created_at";

/// Row for material queries
#[derive(Debug, FromRow)]
struct MaterialRow {
    id: Uuid,
    name: String,
    unit_of_measure: String,
    on_hand_quantity: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            unit_of_measure: row.unit_of_measure,
            on_hand_quantity: row.on_hand_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Row for batch queries
#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    material_id: Uuid,
    receipt_date: DateTime<Utc>,
    batch_sequence: i64,
    initial_quantity: Decimal,
    remaining_quantity: Decimal,
    unit_cost: Decimal,
    expiry_date: Option<NaiveDate>,
    lot_label: Option<String>,
    source_reference: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for StockBatch {
    fn from(row: BatchRow) -> Self {
        Self {
            id: row.id,
            material_id: row.material_id,
            receipt_date: row.receipt_date,
            sequence: row.batch_sequence,
            initial_quantity: row.initial_quantity,
            remaining_quantity: row.remaining_quantity,
            unit_cost: row.unit_cost,
            expiry_date: row.expiry_date,
            lot_label: row.lot_label,
            source_reference: row.source_reference,
            created_at: row.created_at,
        }
    }
}

/// Row for movement queries
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    movement_sequence: i64,
    material_id: Uuid,
    direction: String,
    quantity: Decimal,
    unit_price: Decimal,
    reference_kind: String,
    reference_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for MovementRecord {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let direction = MovementDirection::from_str(&row.direction).ok_or_else(|| {
            AppError::StorageFailure(format!("unknown movement direction {:?}", row.direction))
        })?;
        let reference_kind = ReferenceKind::from_str(&row.reference_kind).ok_or_else(|| {
            AppError::StorageFailure(format!("unknown reference kind {:?}", row.reference_kind))
        })?;

        Ok(Self {
            id: row.id,
            sequence: row.movement_sequence,
            material_id: row.material_id,
            direction,
            quantity: row.quantity,
            unit_price: row.unit_price,
            reference_kind,
            reference_id: row.reference_id,
            occurred_at: row.occurred_at,
        })
    }
}

/// Row for cost detail queries
#[derive(Debug, FromRow)]
struct CostDetailRow {
    id: Uuid,
    sale_line_id: Uuid,
    batch_id: Uuid,
    material_id: Uuid,
    quantity: Decimal,
    unit_cost: Decimal,
    created_at: DateTime<Utc>,
}

impl From<CostDetailRow> for CostDetail {
    fn from(row: CostDetailRow) -> Self {
        Self {
            id: row.id,
            sale_line_id: row.sale_line_id,
            batch_id: row.batch_id,
            material_id: row.material_id,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            created_at: row.created_at,
        }
    }
}

/// Ledger store backed by PostgreSQL
#[derive(Clone)]
pub struct PgLedgerStore {
    db: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_material(&self, material: &Material) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO materials (id, name, unit_of_measure, on_hand_quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(material.id)
        .bind(&material.name)
        .bind(&material.unit_of_measure)
        .bind(material.on_hand_quantity)
        .bind(material.created_at)
        .bind(material.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get_material(&self, material_id: Uuid) -> AppResult<Option<Material>> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {} FROM materials WHERE id = $1",
            MATERIAL_COLUMNS
        ))
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn begin(&self, material_id: Uuid) -> AppResult<Box<dyn LedgerTransaction>> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        let material = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {} FROM materials WHERE id = $1 FOR UPDATE",
            MATERIAL_COLUMNS
        ))
        .bind(material_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Material".to_string()))?;

        Ok(Box::new(PgLedgerTransaction {
            tx,
            material: material.into(),
        }))
    }

    async fn list_batches(&self, material_id: Uuid) -> AppResult<Vec<StockBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {}
            FROM stock_batches
            WHERE material_id = $1
            ORDER BY receipt_date ASC, batch_sequence ASC
            "#,
            BATCH_COLUMNS
        ))
        .bind(material_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn expiring_batches(&self, from: NaiveDate, until: NaiveDate) -> AppResult<Vec<StockBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {}
            FROM stock_batches
            WHERE remaining_quantity > 0
              AND expiry_date IS NOT NULL
              AND expiry_date BETWEEN $1 AND $2
            ORDER BY expiry_date ASC, receipt_date ASC, batch_sequence ASC
            "#,
            BATCH_COLUMNS
        ))
        .bind(from)
        .bind(until)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_movements(&self, material_id: Uuid) -> AppResult<Vec<MovementRecord>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {}
            FROM stock_movements
            WHERE material_id = $1
            ORDER BY movement_sequence ASC
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(material_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementRecord::try_from).collect()
    }

    async fn cost_details_for_sale_line(&self, sale_line_id: Uuid) -> AppResult<Vec<CostDetail>> {
        let rows = sqlx::query_as::<_, CostDetailRow>(&format!(
            "SELECT {} FROM cost_details WHERE sale_line_id = $1 ORDER BY created_at ASC, id ASC",
            COST_DETAIL_COLUMNS
        ))
        .bind(sale_line_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_sale_line_cost_details(&self, sale_line_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM cost_details WHERE sale_line_id = $1")
            .bind(sale_line_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
    material: Material,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    fn material(&self) -> &Material {
        &self.material
    }

    async fn available_batches(&mut self) -> AppResult<Vec<StockBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {}
            FROM stock_batches
            WHERE material_id = $1 AND remaining_quantity > 0
            ORDER BY receipt_date ASC, batch_sequence ASC
            "#,
            BATCH_COLUMNS
        ))
        .bind(self.material.id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_sale_line(&mut self, sale_line_id: Uuid) -> AppResult<bool> {
        // A concurrent claim blocks here until its transaction ends.
        let result = sqlx::query(
            r#"
            INSERT INTO consumed_sale_lines (sale_line_id, material_id)
            VALUES ($1, $2)
            ON CONFLICT (sale_line_id) DO NOTHING
            "#,
        )
        .bind(sale_line_id)
        .bind(self.material.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_batch(&mut self, batch: NewBatch) -> AppResult<StockBatch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            INSERT INTO stock_batches (
                id, material_id, receipt_date, initial_quantity, remaining_quantity,
                unit_cost, expiry_date, lot_label, source_reference
            )
            VALUES ($1, $2, $3, $4, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(batch.material_id)
        .bind(batch.receipt_date)
        .bind(batch.quantity)
        .bind(batch.unit_cost)
        .bind(batch.expiry_date)
        .bind(&batch.lot_label)
        .bind(batch.source_reference)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn set_batch_remaining(&mut self, batch_id: Uuid, remaining: Decimal) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_batches
            SET remaining_quantity = $1
            WHERE id = $2 AND material_id = $3
            "#,
        )
        .bind(remaining)
        .bind(batch_id)
        .bind(self.material.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Batch".to_string()));
        }

        Ok(())
    }

    async fn insert_cost_detail(&mut self, detail: &CostDetail) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cost_details (id, sale_line_id, batch_id, material_id, quantity, unit_cost, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(detail.id)
        .bind(detail.sale_line_id)
        .bind(detail.batch_id)
        .bind(detail.material_id)
        .bind(detail.quantity)
        .bind(detail.unit_cost)
        .bind(detail.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn append_movement(&mut self, movement: NewMovement) -> AppResult<MovementRecord> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            INSERT INTO stock_movements (
                id, material_id, direction, quantity, unit_price, reference_kind, reference_id, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(movement.material_id)
        .bind(movement.direction.as_str())
        .bind(movement.quantity)
        .bind(movement.unit_price)
        .bind(movement.reference_kind.as_str())
        .bind(movement.reference_id)
        .bind(movement.occurred_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn recompute_on_hand(&mut self) -> AppResult<Decimal> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            UPDATE materials
            SET on_hand_quantity = (
                    SELECT COALESCE(SUM(remaining_quantity), 0)
                    FROM stock_batches
                    WHERE material_id = $1
                ),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(self.material.id)
        .fetch_one(&mut *self.tx)
        .await?;

        self.material = row.into();
        Ok(self.material.on_hand_quantity)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
