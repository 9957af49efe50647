//! Sealed/opened split of a flat on-hand quantity.
//!
//! `2.37` bottles on hand means 2 sealed bottles and one opened bottle with 37% left.
//! The fractional part is rounded to a fixed number of decimals before splitting so a
//! true `2.0` never shows up as `1` sealed plus `0.999999` opened.

use serde::{Deserialize, Serialize};

use larder_core::{EngineError, EngineResult, ValueObject};

/// Decimal places kept by [`split_quantity`] and [`compose_quantity`].
pub const DEFAULT_PRECISION: u32 = 4;

/// Round `value` to `precision` decimal places.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitQuantity {
    pub sealed_count: u64,
    /// In [0, 1).
    pub opened_fraction: f64,
}

impl ValueObject for SplitQuantity {}

impl SplitQuantity {
    pub fn from_flat(quantity: f64, precision: u32) -> EngineResult<Self> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(EngineError::invalid(format!(
                "quantity must be a non-negative number, got {quantity}"
            )));
        }

        let rounded = round_to(quantity, precision);
        let mut sealed = rounded.floor();
        let mut opened = round_to(rounded - sealed, precision);
        if opened >= 1.0 {
            sealed += 1.0;
            opened = 0.0;
        }

        Ok(Self {
            sealed_count: sealed as u64,
            opened_fraction: opened,
        })
    }

    pub fn to_flat(self, precision: u32) -> f64 {
        round_to(self.sealed_count as f64 + self.opened_fraction, precision)
    }

    pub fn display(self) -> StockDisplay {
        StockDisplay::from(self)
    }
}

/// Split a flat quantity with the default precision.
pub fn split_quantity(quantity: f64) -> EngineResult<SplitQuantity> {
    SplitQuantity::from_flat(quantity, DEFAULT_PRECISION)
}

/// Inverse of [`split_quantity`], rounded to [`DEFAULT_PRECISION`].
///
/// Rejects an opened fraction outside [0, 1).
pub fn compose_quantity(sealed_count: u64, opened_fraction: f64) -> EngineResult<f64> {
    compose_quantity_with(sealed_count, opened_fraction, DEFAULT_PRECISION)
}

/// Inverse of [`SplitQuantity::from_flat`] at the same `precision`.
pub fn compose_quantity_with(
    sealed_count: u64,
    opened_fraction: f64,
    precision: u32,
) -> EngineResult<f64> {
    if !opened_fraction.is_finite() || !(0.0..1.0).contains(&opened_fraction) {
        return Err(EngineError::invalid(format!(
            "opened fraction must be in [0, 1), got {opened_fraction}"
        )));
    }
    Ok(SplitQuantity {
        sealed_count,
        opened_fraction,
    }
    .to_flat(precision))
}

/// Recount entry mode: sealed units plus the percentage left in the opened one.
pub fn compose_from_percent(sealed_count: u64, percent_remaining: f64) -> EngineResult<f64> {
    if !percent_remaining.is_finite() || !(0.0..=100.0).contains(&percent_remaining) {
        return Err(EngineError::invalid(format!(
            "percent remaining must be in [0, 100], got {percent_remaining}"
        )));
    }
    Ok(round_to(
        sealed_count as f64 + percent_remaining / 100.0,
        DEFAULT_PRECISION,
    ))
}

/// Shelf view of a split quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDisplay {
    pub sealed_count: u64,
    /// 1 when an opened container has anything left, else 0.
    pub opened_units: u64,
    /// What is left in the opened container, 0-100.
    pub percent_remaining: u8,
    /// Containers physically on the shelf.
    pub total_physical: u64,
}

impl From<SplitQuantity> for StockDisplay {
    fn from(split: SplitQuantity) -> Self {
        let percent = (split.opened_fraction * 100.0).round().clamp(0.0, 100.0) as u8;
        let opened_units = u64::from(percent > 0);
        Self {
            sealed_count: split.sealed_count,
            opened_units,
            percent_remaining: percent,
            total_physical: split.sealed_count + opened_units,
        }
    }
}
