//! Inventory record types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of an equipment record
pub type EquipmentId = u64;

/// Kind of equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentType {
    Notebook,
    Desktop,
    Servidor,
    Monitor,
    Impressora,
    Roteador,
    Switch,
    Smartphone,
}

impl EquipmentType {
    pub const ALL: [EquipmentType; 8] = [
        Self::Notebook,
        Self::Desktop,
        Self::Servidor,
        Self::Monitor,
        Self::Impressora,
        Self::Roteador,
        Self::Switch,
        Self::Smartphone,
    ];

    /// Upper-case name used in the index and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notebook => "NOTEBOOK",
            Self::Desktop => "DESKTOP",
            Self::Servidor => "SERVIDOR",
            Self::Monitor => "MONITOR",
            Self::Impressora => "IMPRESSORA",
            Self::Roteador => "ROTEADOR",
            Self::Switch => "SWITCH",
            Self::Smartphone => "SMARTPHONE",
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown equipment type '{}'", s))
    }
}

/// Lifecycle status of a piece of equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    EmEstoque,
    EmUso,
    Reservado,
    EmManutencao,
    EmGarantia,
    AguardandoDescarte,
    Descartado,
    PerdidoOuRoubado,
}

impl EquipmentStatus {
    pub const ALL: [EquipmentStatus; 8] = [
        Self::EmEstoque,
        Self::EmUso,
        Self::Reservado,
        Self::EmManutencao,
        Self::EmGarantia,
        Self::AguardandoDescarte,
        Self::Descartado,
        Self::PerdidoOuRoubado,
    ];

    /// Upper-case name used in the index and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmEstoque => "EM_ESTOQUE",
            Self::EmUso => "EM_USO",
            Self::Reservado => "RESERVADO",
            Self::EmManutencao => "EM_MANUTENCAO",
            Self::EmGarantia => "EM_GARANTIA",
            Self::AguardandoDescarte => "AGUARDANDO_DESCARTE",
            Self::Descartado => "DESCARTADO",
            Self::PerdidoOuRoubado => "PERDIDO_OU_ROUBADO",
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown equipment status '{}'", s))
    }
}

/// An inventory record as held by the primary store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: EquipmentId,
    #[serde(rename = "type")]
    pub equipment_type: EquipmentType,
    pub brand: String,
    pub model: String,
    pub asset_number: Option<String>,
    pub status: EquipmentStatus,
    pub location: String,
    pub responsible: String,
    pub acquisition_date: Option<NaiveDate>,
    pub acquisition_value: Option<f64>,
}

/// Mutable fields of an equipment record, as supplied by a create or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentInput {
    #[serde(rename = "type")]
    pub equipment_type: EquipmentType,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub asset_number: Option<String>,
    pub status: EquipmentStatus,
    pub location: String,
    pub responsible: String,
    #[serde(default)]
    pub acquisition_date: Option<NaiveDate>,
    #[serde(default)]
    pub acquisition_value: Option<f64>,
}

impl EquipmentInput {
    /// Materialize the input as a record with the given id
    pub fn into_record(self, id: EquipmentId) -> Equipment {
        Equipment {
            id,
            equipment_type: self.equipment_type,
            brand: self.brand,
            model: self.model,
            asset_number: self.asset_number,
            status: self.status,
            location: self.location,
            responsible: self.responsible,
            acquisition_date: self.acquisition_date,
            acquisition_value: self.acquisition_value,
        }
    }
}

/// Normalize an asset number to the `AAA-00000` form.
///
/// Accepts three letters, a dash and one to five digits in any case
/// (`inv-13` becomes `INV-00013`). Other shapes are only trimmed and
/// upper-cased.
pub fn normalize_asset_number(raw: &str) -> String {
    let s = raw.trim().to_uppercase();

    let Some((prefix, digits)) = s.split_once('-') else {
        return s;
    };
    let prefix_ok = prefix.len() == 3 && prefix.chars().all(|c| c.is_ascii_uppercase());
    let digits_ok =
        (1..=5).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    if !prefix_ok || !digits_ok {
        return s;
    }

    match digits.parse::<u32>() {
        Ok(n) => format!("{}-{:05}", prefix, n),
        Err(_) => s,
    }
}
