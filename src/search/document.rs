//! Index document projection

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::inventory::{Equipment, EquipmentId};

/// Separator between the parts of the derived full-text field
pub const DESCRIPTION_SEPARATOR: &str = " | ";

/// Denormalized, searchable projection of an equipment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentDoc {
    #[serde(rename = "idEquipment")]
    pub id: EquipmentId,
    pub asset_number: Option<String>,
    #[serde(rename = "type")]
    pub equipment_type: String,
    pub status: String,
    pub brand: String,
    pub model: String,
    pub location: String,
    pub responsible: String,
    pub acquisition_date: Option<NaiveDate>,
    pub acquisition_value: Option<f64>,
    /// Derived full-text field: asset number, brand, model, location and
    /// responsible joined by [`DESCRIPTION_SEPARATOR`]
    pub description: String,
}

impl From<&Equipment> for EquipmentDoc {
    fn from(e: &Equipment) -> Self {
        Self {
            id: e.id,
            asset_number: e.asset_number.clone(),
            equipment_type: e.equipment_type.as_str().to_string(),
            status: e.status.as_str().to_string(),
            brand: e.brand.clone(),
            model: e.model.clone(),
            location: e.location.clone(),
            responsible: e.responsible.clone(),
            acquisition_date: e.acquisition_date,
            acquisition_value: e.acquisition_value,
            description: build_description(e),
        }
    }
}

fn build_description(e: &Equipment) -> String {
    [
        e.asset_number.as_deref().unwrap_or(""),
        e.brand.as_str(),
        e.model.as_str(),
        e.location.as_str(),
        e.responsible.as_str(),
    ]
    .join(DESCRIPTION_SEPARATOR)
}
