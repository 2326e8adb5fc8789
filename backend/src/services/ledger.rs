//! FIFO ledger engine: receipts, consumptions and stock queries
//!
//! Every receive/consume runs inside one store transaction holding the
//! material's lock. The sufficiency check, the batch decrements, the cost
//! details, the movement and the on-hand recomputation either all commit or
//! all roll back.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    available_in_fifo_order, checked_sum, expiry_window, movement_net, plan_consumption,
    realized_cost, validate_expiry_date, validate_lot_label, validate_quantity,
    validate_unit_cost, AmountOverflow, ConsumptionResult, CostDetail, Material, MovementDirection, MovementRecord, NewMovement,
    ReceiveStockInput, ReconciliationReport, ReferenceKind, StockBatch, StockStatus,
    AVERAGE_COST_SCALE,
};
use uuid::Uuid;

use crate::error::{validate_field, AppError, AppResult};
use crate::store::{LedgerStore, NewBatch};

/// Ledger service shared by the purchase, sale and reporting collaborators
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

/// Input for consuming stock on behalf of a sale line
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeStockInput {
    pub quantity: Decimal,
    pub sale_line_id: Uuid,
}

/// Cost breakdown recorded for a sale line
#[derive(Debug, Clone, Serialize)]
pub struct SaleLineCost {
    pub sale_line_id: Uuid,
    pub cost_details: Vec<CostDetail>,
    pub quantity: Decimal,
    pub realized_cost: Decimal,
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Receive,
    Consume,
    Recompute,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Receive => "receive",
            Operation::Consume => "consume",
            Operation::Recompute => "recompute",
        }
    }
}

fn log_failure(operation: Operation, material_id: Uuid, quantity: Decimal, err: &AppError) {
    let operation = operation.as_str();
    if err.is_user_facing() {
        tracing::warn!(operation = operation, %material_id, %quantity, error = %err, "Ledger operation rejected");
    } else if err.is_retryable() {
        tracing::warn!(operation = operation, %material_id, %quantity, error = %err, "Ledger operation conflicted");
    } else {
        tracing::error!(operation = operation, %material_id, %quantity, error = ?err, "Ledger operation failed");
    }
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Receive stock into a new batch
    #[tracing::instrument(skip_all, fields(operation = "receive", %material_id, quantity = %input.quantity))]
    pub async fn receive(&self, material_id: Uuid, input: ReceiveStockInput) -> AppResult<StockBatch> {
        let quantity = input.quantity;
        let result = self.receive_batch(material_id, input).await;
        if let Err(err) = &result {
            log_failure(Operation::Receive, material_id, quantity, err);
        }
        result
    }

    async fn receive_batch(&self, material_id: Uuid, input: ReceiveStockInput) -> AppResult<StockBatch> {
        validate_field("quantity", validate_quantity(input.quantity))?;
        validate_field("unit_cost", validate_unit_cost(input.unit_cost))?;
        validate_field(
            "expiry_date",
            validate_expiry_date(input.receipt_date, input.expiry_date),
        )?;
        validate_field("lot_label", validate_lot_label(input.lot_label.as_deref()))?;

        let mut tx = self.store.begin(material_id).await?;

        let batch = tx
            .insert_batch(NewBatch {
                material_id,
                receipt_date: input.receipt_date,
                quantity: input.quantity,
                unit_cost: input.unit_cost,
                expiry_date: input.expiry_date,
                lot_label: input.lot_label,
                source_reference: input.source_reference,
            })
            .await?;

        tx.append_movement(NewMovement {
            material_id,
            direction: MovementDirection::In,
            quantity: batch.initial_quantity,
            unit_price: batch.unit_cost,
            reference_kind: ReferenceKind::PurchaseReceipt,
            reference_id: batch.source_reference,
            occurred_at: Utc::now(),
        })
        .await?;

        let on_hand = tx.recompute_on_hand().await?;
        tx.commit().await?;

        tracing::info!(
            %material_id,
            batch_id = %batch.id,
            sequence = batch.sequence,
            quantity = %batch.initial_quantity,
            unit_cost = %batch.unit_cost,
            %on_hand,
            "Stock received"
        );

        Ok(batch)
    }

    /// Consume stock oldest-batch-first for a sale line
    #[tracing::instrument(skip_all, fields(operation = "consume", %material_id, quantity = %input.quantity))]
    pub async fn consume(&self, material_id: Uuid, input: ConsumeStockInput) -> AppResult<ConsumptionResult> {
        let quantity = input.quantity;
        let result = self.consume_batches(material_id, input).await;
        if let Err(err) = &result {
            log_failure(Operation::Consume, material_id, quantity, err);
        }
        result
    }

    async fn consume_batches(
        &self,
        material_id: Uuid,
        input: ConsumeStockInput,
    ) -> AppResult<ConsumptionResult> {
        let ConsumeStockInput {
            quantity,
            sale_line_id,
        } = input;
        validate_field("quantity", validate_quantity(quantity))?;

        let mut tx = self.store.begin(material_id).await?;

        if !tx.claim_sale_line(sale_line_id).await? {
            return Err(AppError::validation(
                "sale_line_id",
                "Stock has already been consumed for this sale line",
            ));
        }

        // Pre-flight: the plan is rejected whole before any batch is touched.
        let batches = tx.available_batches().await?;
        let plan = plan_consumption(&batches, quantity)
            .map_err(|err| AppError::from_fifo(material_id, err))?;

        let now = Utc::now();
        let mut cost_details = Vec::with_capacity(plan.allocations.len());
        for allocation in &plan.allocations {
            tx.set_batch_remaining(allocation.batch_id, allocation.remaining_after)
                .await?;

            let detail = CostDetail {
                id: Uuid::new_v4(),
                sale_line_id,
                batch_id: allocation.batch_id,
                material_id,
                quantity: allocation.quantity,
                unit_cost: allocation.unit_cost,
                created_at: now,
            };
            tx.insert_cost_detail(&detail).await?;
            cost_details.push(detail);
        }

        let realized = realized_cost(&cost_details)?;
        let unit_price = realized
            .checked_div(quantity)
            .ok_or(AmountOverflow("unit_price"))?
            .round_dp(AVERAGE_COST_SCALE);
        tx.append_movement(NewMovement {
            material_id,
            direction: MovementDirection::Out,
            quantity,
            unit_price,
            reference_kind: ReferenceKind::SaleLine,
            reference_id: Some(sale_line_id),
            occurred_at: now,
        })
        .await?;

        let on_hand = tx.recompute_on_hand().await?;
        tx.commit().await?;

        tracing::info!(
            %material_id,
            %sale_line_id,
            %quantity,
            batches = cost_details.len(),
            realized_cost = %realized,
            %on_hand,
            "Stock consumed"
        );

        Ok(ConsumptionResult {
            material_id,
            sale_line_id,
            quantity,
            cost_details,
            realized_cost: realized,
        })
    }

    /// Recompute the cached on-hand quantity from the material's batches
    #[tracing::instrument(skip(self), fields(operation = "recompute"))]
    pub async fn recompute_on_hand(&self, material_id: Uuid) -> AppResult<Decimal> {
        let result = self.recompute_in_tx(material_id).await;
        if let Err(err) = &result {
            log_failure(Operation::Recompute, material_id, Decimal::ZERO, err);
        }
        result
    }

    async fn recompute_in_tx(&self, material_id: Uuid) -> AppResult<Decimal> {
        let mut tx = self.store.begin(material_id).await?;
        let on_hand = tx.recompute_on_hand().await?;
        tx.commit().await?;
        tracing::debug!(%material_id, %on_hand, "On-hand quantity recomputed");
        Ok(on_hand)
    }

    /// Current stock status over the material's non-exhausted batches
    pub async fn stock_status(&self, material_id: Uuid) -> AppResult<StockStatus> {
        self.require_material(material_id).await?;
        let batches = self.store.list_batches(material_id).await?;
        Ok(StockStatus::from_batches(material_id, &batches)?)
    }

    /// Non-exhausted batches in the order consumption would draw them
    pub async fn available_batches(&self, material_id: Uuid) -> AppResult<Vec<StockBatch>> {
        self.require_material(material_id).await?;
        let batches = self.store.list_batches(material_id).await?;
        Ok(available_in_fifo_order(&batches).into_iter().cloned().collect())
    }

    /// Non-exhausted batches of any material expiring between `today` and
    /// `today + days`, soonest first. Batches without an expiry are excluded.
    pub async fn expiring_batches(&self, today: NaiveDate, days: i64) -> AppResult<Vec<StockBatch>> {
        let (from, until) =
            expiry_window(today, days).map_err(|message| AppError::validation("days", message))?;

        self.store.expiring_batches(from, until).await
    }

    /// Movement log of a material in append order
    pub async fn movements(&self, material_id: Uuid) -> AppResult<Vec<MovementRecord>> {
        self.require_material(material_id).await?;
        self.store.list_movements(material_id).await
    }

    /// Cost details recorded for a sale line and its realized cost
    pub async fn sale_line_cost(&self, sale_line_id: Uuid) -> AppResult<SaleLineCost> {
        let cost_details = self.store.cost_details_for_sale_line(sale_line_id).await?;
        if cost_details.is_empty() {
            return Err(AppError::NotFound("Sale line cost details".to_string()));
        }

        Ok(SaleLineCost {
            sale_line_id,
            quantity: checked_sum(cost_details.iter().map(|d| d.quantity), "quantity")?,
            realized_cost: realized_cost(&cost_details)?,
            cost_details,
        })
    }

    /// Drop the cost details of a deleted sale line.
    ///
    /// Batch quantities are not restored and no movement is written: removing
    /// the breakdown never reverses the consumption it describes.
    pub async fn purge_sale_line(&self, sale_line_id: Uuid) -> AppResult<u64> {
        let removed = self.store.delete_sale_line_cost_details(sale_line_id).await?;
        tracing::info!(%sale_line_id, removed = removed, "Sale line cost details purged");
        Ok(removed)
    }

    /// Compare the movement log, batch state and cached on-hand quantity
    pub async fn reconcile(&self, material_id: Uuid) -> AppResult<ReconciliationReport> {
        let material = self.require_material(material_id).await?;
        let batches = self.store.list_batches(material_id).await?;
        let movements = self.store.list_movements(material_id).await?;

        let batch_remaining =
            checked_sum(batches.iter().map(|b| b.remaining_quantity), "batch_remaining")?;
        let report = ReconciliationReport::new(
            material_id,
            movement_net(&movements)?,
            batch_remaining,
            material.on_hand_quantity,
        );

        if !report.balanced {
            tracing::warn!(
                %material_id,
                movement_net = %report.movement_net,
                batch_remaining = %report.batch_remaining,
                cached_on_hand = %report.cached_on_hand,
                "Ledger out of balance"
            );
        }

        Ok(report)
    }

    async fn require_material(&self, material_id: Uuid) -> AppResult<Material> {
        self.store
            .get_material(material_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Material".to_string()))
    }
}
