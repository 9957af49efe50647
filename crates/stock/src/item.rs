use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use larder_core::{Aggregate, AggregateRoot, EngineError, MaterialId, TransactionId};

use crate::quantity::{DEFAULT_PRECISION, round_to};
use crate::store::StockRecord;
use crate::transaction::{StockChange, StockTransaction, TransactionKind};

/// Aggregate root: on-hand stock of one material.
#[derive(Debug, Clone, PartialEq)]
pub struct StockItem {
    material_id: MaterialId,
    on_hand: f64,
    version: u64,
    precision: u32,
}

impl StockItem {
    /// Empty item for rehydration from a transaction log.
    pub fn empty(material_id: MaterialId) -> Self {
        Self {
            material_id,
            on_hand: 0.0,
            version: 0,
            precision: DEFAULT_PRECISION,
        }
    }

    /// Item rehydrated from a stored snapshot.
    pub fn from_record(material_id: MaterialId, record: StockRecord, precision: u32) -> Self {
        Self {
            material_id,
            on_hand: record.on_hand,
            version: record.version,
            precision,
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn material_id(&self) -> &MaterialId {
        &self.material_id
    }

    pub fn on_hand(&self) -> f64 {
        self.on_hand
    }
}

impl AggregateRoot for StockItem {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.material_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: relative adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub transaction_id: TransactionId,
    pub material_id: MaterialId,
    pub delta: f64,
    /// Defaults to `In`/`Out` by the sign of `delta`.
    pub kind: Option<TransactionKind>,
    pub reason: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: absolute set after a physical recount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStockCount {
    pub transaction_id: TransactionId,
    pub material_id: MaterialId,
    pub new_on_hand: f64,
    pub reason: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockCommand {
    Adjust(AdjustStock),
    SetCount(SetStockCount),
}

impl StockCommand {
    pub fn material_id(&self) -> &MaterialId {
        match self {
            StockCommand::Adjust(c) => &c.material_id,
            StockCommand::SetCount(c) => &c.material_id,
        }
    }
}

impl Aggregate for StockItem {
    type Command = StockCommand;
    type Event = StockTransaction;
    type Error = EngineError;

    fn apply(&mut self, event: &Self::Event) {
        self.on_hand = round_to(event.change.apply_to(self.on_hand), self.precision);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Adjust(cmd) => self.handle_adjust(cmd),
            StockCommand::SetCount(cmd) => self.handle_set_count(cmd),
        }
    }
}

impl StockItem {
    fn ensure_material(&self, material_id: &MaterialId) -> Result<(), EngineError> {
        if &self.material_id != material_id {
            return Err(EngineError::invalid(format!(
                "command for '{material_id}' sent to stock item '{}'",
                self.material_id
            )));
        }
        Ok(())
    }

    fn ensure_audit_fields(reason: &str, actor: &str) -> Result<(), EngineError> {
        if reason.trim().is_empty() {
            return Err(EngineError::invalid("reason cannot be empty"));
        }
        if actor.trim().is_empty() {
            return Err(EngineError::invalid("actor cannot be empty"));
        }
        Ok(())
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockTransaction>, EngineError> {
        self.ensure_material(&cmd.material_id)?;
        Self::ensure_audit_fields(&cmd.reason, &cmd.actor)?;

        if !cmd.delta.is_finite() {
            return Err(EngineError::invalid("delta must be a finite number"));
        }
        if cmd.delta == 0.0 {
            return Err(EngineError::invalid("delta cannot be zero"));
        }
        let kind = cmd.kind.unwrap_or_else(|| TransactionKind::for_delta(cmd.delta));
        if kind == TransactionKind::Count {
            return Err(EngineError::invalid(
                "count transactions are absolute; use a stock count instead",
            ));
        }

        // Rejected rather than clamped: the caller decides whether to force it.
        let new_on_hand = round_to(self.on_hand + cmd.delta, self.precision);
        if new_on_hand < 0.0 {
            return Err(EngineError::NegativeStock {
                material_id: cmd.material_id.clone(),
                attempted: new_on_hand,
            });
        }

        Ok(vec![StockTransaction {
            id: cmd.transaction_id,
            material_id: cmd.material_id.clone(),
            kind,
            change: StockChange::Delta(cmd.delta),
            on_hand_after: new_on_hand,
            actor: cmd.actor.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_set_count(&self, cmd: &SetStockCount) -> Result<Vec<StockTransaction>, EngineError> {
        self.ensure_material(&cmd.material_id)?;
        Self::ensure_audit_fields(&cmd.reason, &cmd.actor)?;

        if !cmd.new_on_hand.is_finite() || cmd.new_on_hand < 0.0 {
            return Err(EngineError::invalid(format!(
                "stock count must be a non-negative number, got {}",
                cmd.new_on_hand
            )));
        }
        let new_on_hand = round_to(cmd.new_on_hand, self.precision);

        Ok(vec![StockTransaction {
            id: cmd.transaction_id,
            material_id: cmd.material_id.clone(),
            kind: TransactionKind::Count,
            change: StockChange::SetTo(new_on_hand),
            on_hand_after: new_on_hand,
            actor: cmd.actor.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> MaterialId {
        MaterialId::new("rum").unwrap()
    }

    fn item_with(on_hand: f64) -> StockItem {
        StockItem::from_record(
            material(),
            StockRecord {
                on_hand,
                version: 1,
            },
            DEFAULT_PRECISION,
        )
    }

    fn adjust(delta: f64) -> StockCommand {
        StockCommand::Adjust(AdjustStock {
            transaction_id: TransactionId::new(),
            material_id: material(),
            delta,
            kind: None,
            reason: "service".to_string(),
            actor: "bar".to_string(),
            occurred_at: Utc::now(),
        })
    }

    fn count(value: f64) -> StockCommand {
        StockCommand::SetCount(SetStockCount {
            transaction_id: TransactionId::new(),
            material_id: material(),
            new_on_hand: value,
            reason: "weekly recount".to_string(),
            actor: "manager".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn adjust_emits_transaction_with_new_on_hand() {
        let item = item_with(3.0);
        let events = item.handle(&adjust(-0.75)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, TransactionKind::Out);
        assert_eq!(events[0].change, StockChange::Delta(-0.75));
        assert!((events[0].on_hand_after - 2.25).abs() < 1e-12);
    }

    #[test]
    fn adjust_below_zero_is_rejected() {
        let item = item_with(3.0);
        match item.handle(&adjust(-5.0)).unwrap_err() {
            EngineError::NegativeStock {
                material_id,
                attempted,
            } => {
                assert_eq!(material_id, material());
                assert_eq!(attempted, -2.0);
            }
            other => panic!("Expected NegativeStock, got {other:?}"),
        }
        assert_eq!(item.on_hand(), 3.0);
    }

    #[test]
    fn float_noise_does_not_trigger_negative_stock() {
        let mut item = item_with(0.3);
        for delta in [-0.1, -0.2] {
            let events = item.handle(&adjust(delta)).unwrap();
            item.apply(&events[0]);
        }
        assert_eq!(item.on_hand(), 0.0);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let item = item_with(1.0);
        assert!(matches!(
            item.handle(&adjust(0.0)),
            Err(EngineError::InvalidReference(_))
        ));
    }

    #[test]
    fn blank_reason_is_rejected() {
        let item = item_with(1.0);
        let cmd = StockCommand::Adjust(AdjustStock {
            transaction_id: TransactionId::new(),
            material_id: material(),
            delta: 1.0,
            kind: None,
            reason: "   ".to_string(),
            actor: "bar".to_string(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(item.handle(&cmd), Err(EngineError::InvalidReference(_))));
    }

    #[test]
    fn explicit_count_kind_on_relative_adjustment_is_rejected() {
        let item = item_with(1.0);
        let cmd = match adjust(1.0) {
            StockCommand::Adjust(mut a) => {
                a.kind = Some(TransactionKind::Count);
                StockCommand::Adjust(a)
            }
            other => other,
        };
        assert!(matches!(item.handle(&cmd), Err(EngineError::InvalidReference(_))));
    }

    #[test]
    fn set_count_replaces_on_hand() {
        let mut item = item_with(7.5);
        let events = item.handle(&count(2.0)).unwrap();
        assert_eq!(events[0].kind, TransactionKind::Count);
        item.apply(&events[0]);
        assert_eq!(item.on_hand(), 2.0);
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn negative_count_is_rejected() {
        let item = item_with(1.0);
        assert!(matches!(
            item.handle(&count(-1.0)),
            Err(EngineError::InvalidReference(_))
        ));
    }

    #[test]
    fn command_for_other_material_is_rejected() {
        let item = StockItem::empty(MaterialId::new("vodka").unwrap());
        assert!(matches!(
            item.handle(&adjust(1.0)),
            Err(EngineError::InvalidReference(_))
        ));
    }
}
