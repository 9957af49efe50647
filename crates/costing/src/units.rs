//! Unit conversion between purchase units and consumption units.
//!
//! Only the canonical metric pairs (kg/g, l/ml) have a derivable factor. Every other
//! pair needs a factor supplied by the operator, stored once in canonical form
//! (`1 purchase_unit = F consumption_unit`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use larder_core::{EngineError, EngineResult};

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

/// Host-provided unit registry.
///
/// The engine only needs to know whether a symbol is recognized; dimension and base
/// factor are used for prefill suggestions.
pub trait UnitRegistry {
    fn is_known(&self, unit: &str) -> bool;

    fn dimension(&self, unit: &str) -> Option<Dimension>;

    /// Size of one `unit` expressed in its dimension's base unit (g, ml or piece).
    fn base_factor(&self, unit: &str) -> Option<f64>;
}

impl<R: UnitRegistry + ?Sized> UnitRegistry for &R {
    fn is_known(&self, unit: &str) -> bool {
        (**self).is_known(unit)
    }

    fn dimension(&self, unit: &str) -> Option<Dimension> {
        (**self).dimension(unit)
    }

    fn base_factor(&self, unit: &str) -> Option<f64> {
        (**self).base_factor(unit)
    }
}

const STANDARD_UNITS: &[(&str, Dimension, f64)] = &[
    ("g", Dimension::Mass, 1.0),
    ("kg", Dimension::Mass, 1000.0),
    ("mg", Dimension::Mass, 0.001),
    ("ขีด", Dimension::Mass, 100.0),
    ("lb", Dimension::Mass, 453.592),
    ("oz", Dimension::Mass, 28.3495),
    ("ml", Dimension::Volume, 1.0),
    ("l", Dimension::Volume, 1000.0),
    ("gallon", Dimension::Volume, 3785.41),
    ("oz_fl", Dimension::Volume, 29.5735),
    ("cup", Dimension::Volume, 240.0),
    ("tbsp", Dimension::Volume, 15.0),
    ("tsp", Dimension::Volume, 5.0),
    ("shot", Dimension::Volume, 30.0),
    ("unit", Dimension::Count, 1.0),
    ("pcs", Dimension::Count, 1.0),
    ("box", Dimension::Count, 1.0),
    ("pack", Dimension::Count, 1.0),
    ("can", Dimension::Count, 1.0),
    ("bottle", Dimension::Count, 1.0),
    ("bag", Dimension::Count, 1.0),
    ("crate", Dimension::Count, 1.0),
    ("carton", Dimension::Count, 1.0),
    ("glass", Dimension::Count, 1.0),
];

/// Built-in registry of kitchen and bar units.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

impl StandardUnits {
    fn lookup(unit: &str) -> Option<(Dimension, f64)> {
        let unit = normalize(unit);
        STANDARD_UNITS
            .iter()
            .find(|(symbol, _, _)| *symbol == unit)
            .map(|(_, dim, factor)| (*dim, *factor))
    }

    pub fn symbols() -> impl Iterator<Item = &'static str> {
        STANDARD_UNITS.iter().map(|(symbol, _, _)| *symbol)
    }
}

impl UnitRegistry for StandardUnits {
    fn is_known(&self, unit: &str) -> bool {
        Self::lookup(unit).is_some()
    }

    fn dimension(&self, unit: &str) -> Option<Dimension> {
        Self::lookup(unit).map(|(dim, _)| dim)
    }

    fn base_factor(&self, unit: &str) -> Option<f64> {
        Self::lookup(unit).map(|(_, factor)| factor)
    }
}

fn normalize(unit: &str) -> String {
    unit.trim().to_lowercase()
}

/// Fixed factor for the canonical metric pairs, `None` for anything else.
pub fn standard_factor(purchase_unit: &str, consumption_unit: &str) -> Option<f64> {
    match (
        normalize(purchase_unit).as_str(),
        normalize(consumption_unit).as_str(),
    ) {
        ("kg", "g") | ("l", "ml") => Some(1000.0),
        ("g", "kg") | ("ml", "l") => Some(0.001),
        _ => None,
    }
}

pub fn is_standard_pair(purchase_unit: &str, consumption_unit: &str) -> bool {
    standard_factor(purchase_unit, consumption_unit).is_some()
}

pub fn reciprocal(factor: f64) -> f64 {
    1.0 / factor
}

/// The two equivalent ways an operator may enter a custom factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum FactorInput {
    /// `1 purchase_unit = F consumption_unit`.
    PerPurchaseUnit(f64),
    /// `1 consumption_unit = X purchase_unit`, so `F = 1 / X`.
    PerConsumptionUnit(f64),
}

impl FactorInput {
    /// Canonical `F` for this input. Rejects zero, negative and non-finite values.
    pub fn canonical(self) -> EngineResult<f64> {
        let (raw, factor) = match self {
            FactorInput::PerPurchaseUnit(f) => (f, f),
            FactorInput::PerConsumptionUnit(x) => (x, reciprocal(x)),
        };
        if !raw.is_finite() || raw <= 0.0 || !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::invalid(format!(
                "conversion factor must be a positive number, got {raw}"
            )));
        }
        Ok(factor)
    }
}

/// Resolves conversion factors, holding the operator-supplied custom pairs.
#[derive(Debug, Clone, Default)]
pub struct UnitConverter<R = StandardUnits> {
    registry: R,
    custom: HashMap<(String, String), f64>,
}

impl UnitConverter<StandardUnits> {
    pub fn standard() -> Self {
        Self::new(StandardUnits)
    }
}

impl<R: UnitRegistry> UnitConverter<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            custom: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    fn ensure_known(&self, unit: &str) -> EngineResult<()> {
        if self.registry.is_known(unit) {
            Ok(())
        } else {
            Err(EngineError::unknown_unit(unit.trim()))
        }
    }

    /// `1 purchase_unit = factor consumption_unit`.
    ///
    /// Identical units give 1, canonical metric pairs give their fixed ratio, other
    /// pairs give the registered custom factor (either direction). A pair with no
    /// registered factor fails with `UnknownUnit` naming the pair.
    pub fn factor(&self, purchase_unit: &str, consumption_unit: &str) -> EngineResult<f64> {
        let from = normalize(purchase_unit);
        let to = normalize(consumption_unit);

        if from == to {
            return Ok(1.0);
        }
        self.ensure_known(&from)?;
        self.ensure_known(&to)?;

        if let Some(fixed) = standard_factor(&from, &to) {
            return Ok(fixed);
        }
        if let Some(f) = self.custom.get(&(from.clone(), to.clone())) {
            return Ok(*f);
        }
        if let Some(f) = self.custom.get(&(to.clone(), from.clone())) {
            return Ok(reciprocal(*f));
        }

        Err(EngineError::unknown_unit(format!("{from} -> {to}")))
    }

    /// Store an operator-supplied factor for a non-derivable pair.
    ///
    /// Returns the factor that is now authoritative for the pair. For canonical
    /// metric pairs and identical units the supplied value is ignored.
    pub fn register_factor(
        &mut self,
        purchase_unit: &str,
        consumption_unit: &str,
        input: FactorInput,
    ) -> EngineResult<f64> {
        let from = normalize(purchase_unit);
        let to = normalize(consumption_unit);
        self.ensure_known(&from)?;
        self.ensure_known(&to)?;
        let factor = input.canonical()?;

        if from == to {
            return Ok(1.0);
        }
        if let Some(fixed) = standard_factor(&from, &to) {
            if factor != fixed {
                tracing::warn!(
                    purchase_unit = %from,
                    consumption_unit = %to,
                    supplied = factor,
                    locked = fixed,
                    "ignoring custom factor for standard unit pair"
                );
            }
            return Ok(fixed);
        }

        self.custom.remove(&(to.clone(), from.clone()));
        self.custom.insert((from, to), factor);
        Ok(factor)
    }

    pub fn custom_factor(&self, purchase_unit: &str, consumption_unit: &str) -> Option<f64> {
        self.custom
            .get(&(normalize(purchase_unit), normalize(consumption_unit)))
            .copied()
    }

    /// Prefill suggestion for a pair of known units of the same dimension.
    ///
    /// Never stored: the operator still confirms the factor via `register_factor`.
    pub fn suggest_factor(&self, purchase_unit: &str, consumption_unit: &str) -> Option<f64> {
        if let Some(fixed) = standard_factor(purchase_unit, consumption_unit) {
            return Some(fixed);
        }
        let from_dim = self.registry.dimension(purchase_unit)?;
        let to_dim = self.registry.dimension(consumption_unit)?;
        if from_dim != to_dim {
            return None;
        }
        let from = self.registry.base_factor(purchase_unit)?;
        let to = self.registry.base_factor(consumption_unit)?;
        if to <= 0.0 {
            return None;
        }
        Some(from / to)
    }
}
