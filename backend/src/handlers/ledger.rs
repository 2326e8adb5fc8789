//! HTTP handlers for ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    ConsumptionResult, MovementRecord, ReceiveStockInput, ReconciliationReport, StockBatch,
    StockStatus,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::ledger::{ConsumeStockInput, LedgerService, SaleLineCost};
use crate::AppState;

/// Request body for receiving stock; the receipt date defaults to now
#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub receipt_date: Option<DateTime<Utc>>,
    pub lot_label: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub source_reference: Option<Uuid>,
}

impl From<ReceiveStockRequest> for ReceiveStockInput {
    fn from(req: ReceiveStockRequest) -> Self {
        Self {
            quantity: req.quantity,
            unit_cost: req.unit_cost,
            receipt_date: req.receipt_date.unwrap_or_else(Utc::now),
            lot_label: req.lot_label,
            expiry_date: req.expiry_date,
            source_reference: req.source_reference,
        }
    }
}

/// Query parameters for the expiring batches report
#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub material_id: Uuid,
    pub on_hand_quantity: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub sale_line_id: Uuid,
    pub removed: u64,
}

/// Receive stock into a new batch
pub async fn receive_stock(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Json(request): Json<ReceiveStockRequest>,
) -> AppResult<(StatusCode, Json<StockBatch>)> {
    let service = LedgerService::new(state.store);
    let batch = service.receive(material_id, request.into()).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// Consume stock for a sale line
pub async fn consume_stock(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
    Json(input): Json<ConsumeStockInput>,
) -> AppResult<Json<ConsumptionResult>> {
    let service = LedgerService::new(state.store);
    let result = service.consume(material_id, input).await?;
    Ok(Json(result))
}

/// Recompute the cached on-hand quantity
pub async fn recompute_on_hand(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<RecomputeResponse>> {
    let service = LedgerService::new(state.store);
    let on_hand_quantity = service.recompute_on_hand(material_id).await?;
    Ok(Json(RecomputeResponse {
        material_id,
        on_hand_quantity,
    }))
}

/// Get stock status for a material
pub async fn get_stock_status(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<StockStatus>> {
    let service = LedgerService::new(state.store);
    let status = service.stock_status(material_id).await?;
    Ok(Json(status))
}

/// List non-exhausted batches in FIFO order
pub async fn list_available_batches(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockBatch>>> {
    let service = LedgerService::new(state.store);
    let batches = service.available_batches(material_id).await?;
    Ok(Json(batches))
}

/// List batches expiring within the requested window
pub async fn list_expiring_batches(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<StockBatch>>> {
    let days = query.days.unwrap_or(state.config.ledger.expiry_window_days);
    let service = LedgerService::new(state.store);
    let batches = service
        .expiring_batches(Utc::now().date_naive(), days)
        .await?;
    Ok(Json(batches))
}

/// List the movement log of a material
pub async fn list_movements(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<Vec<MovementRecord>>> {
    let service = LedgerService::new(state.store);
    let movements = service.movements(material_id).await?;
    Ok(Json(movements))
}

/// Reconcile movements, batches and cached on-hand quantity
pub async fn get_reconciliation(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<ReconciliationReport>> {
    let service = LedgerService::new(state.store);
    let report = service.reconcile(material_id).await?;
    Ok(Json(report))
}

/// Get the cost breakdown of a sale line
pub async fn get_sale_line_cost(
    State(state): State<AppState>,
    Path(sale_line_id): Path<Uuid>,
) -> AppResult<Json<SaleLineCost>> {
    let service = LedgerService::new(state.store);
    let cost = service.sale_line_cost(sale_line_id).await?;
    Ok(Json(cost))
}

/// Remove the cost breakdown of a deleted sale line
pub async fn purge_sale_line(
    State(state): State<AppState>,
    Path(sale_line_id): Path<Uuid>,
) -> AppResult<Json<PurgeResponse>> {
    let service = LedgerService::new(state.store);
    let removed = service.purge_sale_line(sale_line_id).await?;
    Ok(Json(PurgeResponse {
        sale_line_id,
        removed,
    }))
}
