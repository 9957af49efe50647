//! Read-side views over the transaction log and on-hand figures.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{EngineConfig, MaterialId};

use crate::quantity::round_to;
use crate::transaction::{StockChange, StockTransaction, TransactionKind};

/// Replay a transaction log (in write order) into an on-hand figure.
///
/// Absolute sets reset the running value, deltas accumulate.
pub fn rebuild_on_hand(transactions: &[StockTransaction], precision: u32) -> f64 {
    transactions.iter().fold(0.0, |on_hand, t| match t.change {
        StockChange::Delta(delta) => round_to(on_hand + delta, precision),
        StockChange::SetTo(value) => value,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub material_id: MaterialId,
    /// Total withdrawn, as a positive quantity.
    pub total_consumed: f64,
    pub transaction_count: usize,
}

/// Consumption per material from `Out` transactions at or after `since`.
///
/// Sorted by consumption, largest first; ties by material id.
pub fn usage_report(transactions: &[StockTransaction], since: DateTime<Utc>) -> Vec<UsageSummary> {
    let mut by_material: HashMap<&MaterialId, UsageSummary> = HashMap::new();

    for t in transactions {
        if t.kind != TransactionKind::Out || t.occurred_at < since {
            continue;
        }
        let StockChange::Delta(delta) = t.change else {
            continue;
        };
        let entry = by_material
            .entry(&t.material_id)
            .or_insert_with(|| UsageSummary {
                material_id: t.material_id.clone(),
                total_consumed: 0.0,
                transaction_count: 0,
            });
        entry.total_consumed += delta.abs();
        entry.transaction_count += 1;
    }

    let mut report: Vec<UsageSummary> = by_material.into_values().collect();
    report.sort_by(|a, b| {
        b.total_consumed
            .total_cmp(&a.total_consumed)
            .then_with(|| a.material_id.cmp(&b.material_id))
    });
    report
}

/// Per-material restock thresholds, in consumption units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub reorder_point: f64,
    pub min_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockLevel {
    Out,
    Critical,
    Reorder,
    Healthy,
}

impl StockLevel {
    pub fn classify(on_hand: f64, thresholds: StockThresholds, config: &EngineConfig) -> Self {
        if on_hand <= 0.0 {
            StockLevel::Out
        } else if on_hand < config.critical_stock_level || on_hand <= thresholds.min_threshold {
            StockLevel::Critical
        } else if on_hand <= thresholds.reorder_point {
            StockLevel::Reorder
        } else {
            StockLevel::Healthy
        }
    }

    pub fn needs_restock(self) -> bool {
        !matches!(self, StockLevel::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use larder_core::TransactionId;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap()
    }

    fn txn(
        material: &str,
        kind: TransactionKind,
        change: StockChange,
        day: u32,
    ) -> StockTransaction {
        StockTransaction {
            id: TransactionId::new(),
            material_id: MaterialId::new(material).unwrap(),
            kind,
            change,
            on_hand_after: 0.0,
            actor: "staff".to_string(),
            reason: "test".to_string(),
            occurred_at: at(day),
        }
    }

    #[test]
    fn rebuild_resets_on_absolute_sets() {
        let log = vec![
            txn("gin", TransactionKind::In, StockChange::Delta(6.0), 1),
            txn("gin", TransactionKind::Out, StockChange::Delta(-0.3), 2),
            txn("gin", TransactionKind::Count, StockChange::SetTo(5.5), 3),
            txn("gin", TransactionKind::Out, StockChange::Delta(-0.1), 4),
        ];
        assert_eq!(rebuild_on_hand(&log, 4), 5.4);
        assert_eq!(rebuild_on_hand(&[], 4), 0.0);
    }

    #[test]
    fn rebuild_starts_from_the_logged_opening_balance() {
        let opening = StockTransaction::opening(MaterialId::new("rice").unwrap(), 10.0, at(1));
        let log = vec![
            opening,
            txn("rice", TransactionKind::Out, StockChange::Delta(-2.5), 2),
            txn("rice", TransactionKind::In, StockChange::Delta(0.75), 3),
        ];
        assert_eq!(rebuild_on_hand(&log, 4), 8.25);
    }

    #[test]
    fn usage_counts_only_recent_withdrawals() {
        let log = vec![
            txn("gin", TransactionKind::Out, StockChange::Delta(-0.5), 1),
            txn("gin", TransactionKind::Out, StockChange::Delta(-0.25), 10),
            txn("gin", TransactionKind::Out, StockChange::Delta(-0.25), 11),
            txn("lime", TransactionKind::Out, StockChange::Delta(-3.0), 12),
            txn("lime", TransactionKind::In, StockChange::Delta(10.0), 12),
            txn("tonic", TransactionKind::Adjust, StockChange::Delta(-1.0), 12),
        ];

        let report = usage_report(&log, at(12) - Duration::days(7));
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].material_id.as_str(), "lime");
        assert_eq!(report[0].total_consumed, 3.0);
        assert_eq!(report[1].material_id.as_str(), "gin");
        assert_eq!(report[1].total_consumed, 0.5);
        assert_eq!(report[1].transaction_count, 2);
    }

    #[test]
    fn levels_follow_thresholds() {
        let config = EngineConfig::default();
        let thresholds = StockThresholds {
            reorder_point: 4.0,
            min_threshold: 2.0,
        };
        assert_eq!(StockLevel::classify(0.0, thresholds, &config), StockLevel::Out);
        assert_eq!(StockLevel::classify(1.4, thresholds, &config), StockLevel::Critical);
        assert_eq!(StockLevel::classify(2.0, thresholds, &config), StockLevel::Critical);
        assert_eq!(StockLevel::classify(3.5, thresholds, &config), StockLevel::Reorder);
        assert_eq!(StockLevel::classify(4.5, thresholds, &config), StockLevel::Healthy);
        assert!(!StockLevel::Healthy.needs_restock());
    }
}
