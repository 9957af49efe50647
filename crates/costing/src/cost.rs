//! Unit cost of purchased materials and the pricing helpers built on it.
//!
//! These functions are total: bad inputs degrade to `0` instead of failing, so a
//! whole-menu report always renders and broken data shows up as a zero cost.

use crate::material::Material;

/// Cost of one consumption unit of a purchased material.
///
/// `purchase_price / (pack_size * conversion_factor * yield_fraction)`; returns `0`
/// when the pack size or usable quantity is not positive, or the result is not finite.
/// Works on unsaved snapshots ("what-if" pricing).
pub fn real_unit_cost(material: &Material) -> f64 {
    if !(material.pack_size > 0.0) {
        return 0.0;
    }

    let usable_quantity = material.pack_size * material.conversion_factor * material.yield_fraction;
    if !usable_quantity.is_finite() || usable_quantity <= 0.0 {
        return 0.0;
    }

    let cost = material.purchase_price / usable_quantity;
    if cost.is_finite() { cost } else { 0.0 }
}

/// Selling price that puts `total_cost` at `target_cost_fraction` of the price.
///
/// Returns `0` for a target outside (0, 1).
pub fn suggested_price(total_cost: f64, target_cost_fraction: f64) -> f64 {
    if !(target_cost_fraction > 0.0 && target_cost_fraction < 1.0) {
        return 0.0;
    }
    total_cost / target_cost_fraction
}

/// Share of `selling_price` consumed by `total_cost` (food-cost ratio).
pub fn cost_fraction(total_cost: f64, selling_price: f64) -> f64 {
    if !(selling_price > 0.0) {
        return 0.0;
    }
    total_cost / selling_price
}
