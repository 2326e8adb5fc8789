//! Route definitions for the material ledger

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Material catalog and per-material ledger operations
        .nest("/materials", material_routes())
        // Cross-material batch reports
        .nest("/batches", batch_routes())
        // Sale line cost breakdowns
        .nest("/sale-lines", sale_line_routes())
}

/// Material routes
fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_material))
        .route("/:material_id", get(handlers::get_material))
        .route("/:material_id/receipts", post(handlers::receive_stock))
        .route("/:material_id/consumptions", post(handlers::consume_stock))
        .route("/:material_id/recompute", post(handlers::recompute_on_hand))
        .route("/:material_id/stock-status", get(handlers::get_stock_status))
        .route("/:material_id/batches", get(handlers::list_available_batches))
        .route("/:material_id/movements", get(handlers::list_movements))
        .route("/:material_id/reconciliation", get(handlers::get_reconciliation))
}

/// Batch report routes
fn batch_routes() -> Router<AppState> {
    Router::new().route("/expiring", get(handlers::list_expiring_batches))
}

/// Sale line routes
fn sale_line_routes() -> Router<AppState> {
    Router::new().route(
        "/:sale_line_id/cost-details",
        get(handlers::get_sale_line_cost).delete(handlers::purge_sale_line),
    )
}
