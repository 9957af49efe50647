//! Engine error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::MaterialId;

/// Result type used across the costing and stock engines.
pub type EngineResult<T> = Result<T, EngineError>;

/// Ordered list of materials forming a cycle, starting at the point of re-entry.
///
/// For `A -> B -> C -> A` the path is `[A, B, C]`; the closing edge back to the first
/// element is implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CyclePath(Vec<MaterialId>);

impl CyclePath {
    pub fn new(ids: Vec<MaterialId>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[MaterialId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `other` lists the same cycle, possibly starting at a different member.
    pub fn is_rotation_of(&self, other: &[MaterialId]) -> bool {
        if self.0.len() != other.len() {
            return false;
        }
        if self.0.is_empty() {
            return true;
        }
        (0..self.0.len()).any(|shift| {
            self.0
                .iter()
                .cycle()
                .skip(shift)
                .take(other.len())
                .eq(other.iter())
        })
    }
}

impl core::fmt::Display for CyclePath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for id in &self.0 {
            write!(f, "{id} -> ")?;
        }
        match self.0.first() {
            Some(first) => write!(f, "{first}"),
            None => f.write_str("<empty>"),
        }
    }
}

/// Engine-level error.
///
/// Keep this focused on deterministic failures of costing and ledger rules.
/// Storage failures belong to the stock crate's `StoreError`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Cost resolution would revisit a material already on the current path.
    #[error("circular reference: {0}")]
    CircularReference(CyclePath),

    /// A unit symbol (or unit pair) cannot be converted without an explicit factor.
    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    /// A relative adjustment would drive on-hand below zero.
    #[error("negative stock for {material_id}: adjustment would leave {attempted}")]
    NegativeStock {
        material_id: MaterialId,
        attempted: f64,
    },

    /// Missing material, malformed BOM line or otherwise invalid input.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    pub fn unknown_unit(unit: impl Into<String>) -> Self {
        Self::UnknownUnit(unit.into())
    }

    pub fn missing_material(id: &MaterialId) -> Self {
        Self::InvalidReference(format!("material '{id}' not found"))
    }
}
