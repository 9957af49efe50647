use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{Entity, MaterialId, TransactionId};

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Goods received (positive delta).
    In,
    /// Goods consumed or withdrawn (negative delta).
    Out,
    /// Manual correction in either direction.
    Adjust,
    /// Physical recount (absolute set).
    Count,
}

impl TransactionKind {
    /// Default kind for a relative delta.
    pub fn for_delta(delta: f64) -> Self {
        if delta < 0.0 {
            TransactionKind::Out
        } else {
            TransactionKind::In
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::In => "in",
            TransactionKind::Out => "out",
            TransactionKind::Adjust => "adjust",
            TransactionKind::Count => "count",
        }
    }
}

/// Signed delta or absolute-set marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "quantity", rename_all = "snake_case")]
pub enum StockChange {
    Delta(f64),
    SetTo(f64),
}

impl StockChange {
    /// On-hand after applying this change to `on_hand`.
    pub fn apply_to(self, on_hand: f64) -> f64 {
        match self {
            StockChange::Delta(delta) => on_hand + delta,
            StockChange::SetTo(value) => value,
        }
    }
}

/// Append-only audit record written by every ledger mutation.
///
/// Never mutated or deleted once written; on-hand can be rebuilt by replaying these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub material_id: MaterialId,
    pub kind: TransactionKind,
    pub change: StockChange,
    /// On-hand in the consumption unit right after this transaction.
    pub on_hand_after: f64,
    pub actor: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl StockTransaction {
    /// Opening balance of a newly registered material, logged as an absolute count.
    pub fn opening(material_id: MaterialId, on_hand: f64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: TransactionId::new(),
            material_id,
            kind: TransactionKind::Count,
            change: StockChange::SetTo(on_hand),
            on_hand_after: on_hand,
            actor: "system".to_string(),
            reason: "opening balance".to_string(),
            occurred_at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.change {
            StockChange::Delta(_) => "stock.item.adjusted",
            StockChange::SetTo(_) => "stock.item.counted",
        }
    }

    /// JSON form for audit export.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Entity for StockTransaction {
    type Id = TransactionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
