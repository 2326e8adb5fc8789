//! Material catalog service
//!
//! Registration only: the ledger never creates materials on its own, so the
//! catalog collaborator registers them here before stock is received.

use std::sync::Arc;

use serde::Deserialize;
use shared::{validate_material_name, validate_unit_of_measure, Material};
use uuid::Uuid;

use crate::error::{validate_field, AppError, AppResult};
use crate::store::LedgerStore;

/// Material service for registering and looking up materials
#[derive(Clone)]
pub struct MaterialService {
    store: Arc<dyn LedgerStore>,
}

/// Input for registering a material
#[derive(Debug, Deserialize)]
pub struct CreateMaterialInput {
    pub name: String,
    pub unit_of_measure: String,
}

impl MaterialService {
    /// Create a new MaterialService instance
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register a material with zero stock on hand
    pub async fn create_material(&self, input: CreateMaterialInput) -> AppResult<Material> {
        validate_field("name", validate_material_name(&input.name))?;
        validate_field("unit_of_measure", validate_unit_of_measure(&input.unit_of_measure))?;

        let material = Material::new(input.name.trim(), input.unit_of_measure);
        self.store.insert_material(&material).await?;

        tracing::info!(material_id = %material.id, name = %material.name, "Material registered");
        Ok(material)
    }

    /// Get a material by ID
    pub async fn get_material(&self, material_id: Uuid) -> AppResult<Material> {
        self.store
            .get_material(material_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Material".to_string()))
    }
}
