//! Engine configuration.
//!
//! Hosts either deserialize an [`EngineConfig`] from their own settings source or
//! read it from the environment with [`EngineConfig::from_env`].

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const ENV_DEFAULT_OVERHEAD: &str = "LARDER_DEFAULT_OVERHEAD";
pub const ENV_QUANTITY_PRECISION: &str = "LARDER_QUANTITY_PRECISION";
pub const ENV_ALLOW_DEGRADED_WRITES: &str = "LARDER_ALLOW_DEGRADED_WRITES";
pub const ENV_CRITICAL_STOCK_LEVEL: &str = "LARDER_CRITICAL_STOCK_LEVEL";

const MAX_PRECISION: u32 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overhead (Q-factor) applied when the caller does not pass one explicitly.
    pub default_overhead_fraction: f64,
    /// Decimal places kept when splitting a flat quantity into sealed/opened parts.
    pub quantity_precision: u32,
    /// Whether the ledger may fall back to a non-atomic write path.
    pub allow_degraded_writes: bool,
    /// On-hand level below which an item is critical (1.5 = one sealed + half opened).
    pub critical_stock_level: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_overhead_fraction: 0.0,
            quantity_precision: 4,
            allow_degraded_writes: true,
            critical_stock_level: 1.5,
        }
    }
}

impl EngineConfig {
    /// Build a config from `LARDER_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, ENV_DEFAULT_OVERHEAD) {
            config.default_overhead_fraction = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_QUANTITY_PRECISION) {
            config.quantity_precision = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_ALLOW_DEGRADED_WRITES) {
            config.allow_degraded_writes = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_CRITICAL_STOCK_LEVEL) {
            config.critical_stock_level = v;
        }

        config
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.default_overhead_fraction.is_finite() || self.default_overhead_fraction < 0.0 {
            return Err(EngineError::invalid(
                "default_overhead_fraction must be a non-negative number",
            ));
        }
        if self.quantity_precision > MAX_PRECISION {
            return Err(EngineError::invalid(format!(
                "quantity_precision must be at most {MAX_PRECISION}"
            )));
        }
        if !self.critical_stock_level.is_finite() || self.critical_stock_level < 0.0 {
            return Err(EngineError::invalid(
                "critical_stock_level must be a non-negative number",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: core::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}
