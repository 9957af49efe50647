//! Costing engine.
//!
//! Resolves the true cost of a sellable item: unit conversion, yield-adjusted unit
//! cost of purchased materials, and recursive rollup through sub-recipes. Everything
//! here is pure, deterministic logic over in-memory snapshots (no IO, no storage).

pub mod cost;
pub mod graph;
pub mod material;
pub mod report;
pub mod units;

pub use cost::{cost_fraction, real_unit_cost, suggested_price};
pub use graph::{CostBreakdown, CostLine, MaterialGraph, resolve_cost};
pub use material::{BomLine, Material};
pub use report::{CostReport, CostReportEntry};
pub use units::{
    Dimension, FactorInput, StandardUnits, UnitConverter, UnitRegistry, is_standard_pair,
    reciprocal, standard_factor,
};
