use serde::{Deserialize, Serialize};

use larder_core::{EngineError, EngineResult, Entity, MaterialId};

use crate::units::{FactorInput, UnitConverter, UnitRegistry, reciprocal, standard_factor};

/// A purchasable or composite item.
///
/// Composite materials ("sub-recipes") take their cost from BOM lines; their
/// purchase fields are ignored by the rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    /// Cost of one purchased pack.
    pub purchase_price: f64,
    /// Quantity per pack, in `purchase_unit`.
    pub pack_size: f64,
    pub purchase_unit: String,
    pub consumption_unit: String,
    /// `1 purchase_unit = conversion_factor consumption_unit`.
    pub conversion_factor: f64,
    /// Usable fraction after trimming/loss, in (0, 1].
    pub yield_fraction: f64,
    pub is_composite: bool,
    /// On-hand stock in `consumption_unit` (snapshot, owned by the stock ledger).
    pub on_hand_quantity: f64,
}

impl Material {
    /// A purchased ingredient with neutral defaults (one unit per pack, full yield).
    pub fn ingredient(id: MaterialId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            purchase_price: 0.0,
            pack_size: 1.0,
            purchase_unit: "unit".to_string(),
            consumption_unit: "unit".to_string(),
            conversion_factor: 1.0,
            yield_fraction: 1.0,
            is_composite: false,
            on_hand_quantity: 0.0,
        }
    }

    /// A sub-recipe whose cost comes from its bill of materials.
    pub fn composite(id: MaterialId, name: impl Into<String>) -> Self {
        Self {
            is_composite: true,
            ..Self::ingredient(id, name)
        }
    }

    pub fn with_price(mut self, purchase_price: f64, pack_size: f64) -> Self {
        self.purchase_price = purchase_price;
        self.pack_size = pack_size;
        self
    }

    /// Set the unit pair and factor as stored, without applying the standard-pair lock.
    ///
    /// Use [`rebind_units`](Self::rebind_units) for operator edits.
    pub fn with_units(
        mut self,
        purchase_unit: impl Into<String>,
        consumption_unit: impl Into<String>,
        conversion_factor: f64,
    ) -> Self {
        self.purchase_unit = purchase_unit.into();
        self.consumption_unit = consumption_unit.into();
        self.conversion_factor = conversion_factor;
        self
    }

    pub fn with_yield(mut self, yield_fraction: f64) -> Self {
        self.yield_fraction = yield_fraction;
        self
    }

    pub fn with_on_hand(mut self, on_hand_quantity: f64) -> Self {
        self.on_hand_quantity = on_hand_quantity;
        self
    }

    /// Change the unit pair.
    ///
    /// A canonical metric pair overwrites any stored factor with its fixed ratio; a
    /// pair with a registered custom factor takes that factor; otherwise the current
    /// factor is kept for the operator to edit.
    pub fn rebind_units<R: UnitRegistry>(
        &mut self,
        purchase_unit: &str,
        consumption_unit: &str,
        converter: &UnitConverter<R>,
    ) -> EngineResult<f64> {
        match converter.factor(purchase_unit, consumption_unit) {
            Ok(factor) => self.conversion_factor = factor,
            Err(EngineError::UnknownUnit(_))
                if converter.registry().is_known(purchase_unit)
                    && converter.registry().is_known(consumption_unit) => {}
            Err(e) => return Err(e),
        }
        self.purchase_unit = purchase_unit.trim().to_string();
        self.consumption_unit = consumption_unit.trim().to_string();
        Ok(self.conversion_factor)
    }

    /// Apply an operator edit of the conversion factor in either input mode.
    ///
    /// Standard pairs stay locked; the returned value is what is stored.
    pub fn set_conversion_factor(&mut self, input: FactorInput) -> EngineResult<f64> {
        let factor = input.canonical()?;
        self.conversion_factor =
            standard_factor(&self.purchase_unit, &self.consumption_unit).unwrap_or(factor);
        Ok(self.conversion_factor)
    }

    /// The stored factor as shown in "per consumption unit" mode (`1 / F`).
    pub fn display_reciprocal(&self) -> f64 {
        reciprocal(self.conversion_factor)
    }
}

impl Entity for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// An edge from a composite material to one of its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub parent_id: MaterialId,
    pub component_id: MaterialId,
    /// Quantity in the component's consumption unit.
    pub quantity: f64,
    /// Presentation order within the parent's recipe.
    pub position: u32,
}

impl BomLine {
    pub fn new(
        parent_id: MaterialId,
        component_id: MaterialId,
        quantity: f64,
        position: u32,
    ) -> Self {
        Self {
            parent_id,
            component_id,
            quantity,
            position,
        }
    }
}
