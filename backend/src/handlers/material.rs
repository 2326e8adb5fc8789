//! HTTP handlers for material registration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::Material;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::material::{CreateMaterialInput, MaterialService};
use crate::AppState;

/// Register a material
pub async fn create_material(
    State(state): State<AppState>,
    Json(input): Json<CreateMaterialInput>,
) -> AppResult<(StatusCode, Json<Material>)> {
    let service = MaterialService::new(state.store);
    let material = service.create_material(input).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

/// Get material by ID
pub async fn get_material(
    State(state): State<AppState>,
    Path(material_id): Path<Uuid>,
) -> AppResult<Json<Material>> {
    let service = MaterialService::new(state.store);
    let material = service.get_material(material_id).await?;
    Ok(Json(material))
}
