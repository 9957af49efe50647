//! Stock ledger: command execution against a host-controlled store.
//!
//! ```text
//! adjust / set_count
//!   ↓
//! 1. Load the cached record (unknown material -> InvalidReference)
//!   ↓
//! 2. Decide the transaction (pure: NegativeStock, validation)
//!   ↓
//! 3. Atomic commit with an expected version
//!      Conflict          -> reload and retry (bounded)
//!      AtomicUnavailable -> degraded fallback (if allowed)
//!   ↓
//! 4. Degraded fallback, serialized per material:
//!      reload, re-decide, write on-hand, best-effort log write,
//!      result flagged with LedgerWarning::DegradedWrite
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use larder_core::{
    Aggregate, AggregateRoot, EngineConfig, EngineError, EngineResult, ExpectedVersion, MaterialId,
    TransactionId,
};

use crate::item::{AdjustStock, SetStockCount, StockCommand, StockItem};
use crate::quantity::SplitQuantity;
use crate::report::rebuild_on_hand;
use crate::store::{StockStore, StoreError};
use crate::transaction::{StockTransaction, TransactionKind};

/// Atomic commits retried this many times on optimistic-concurrency conflicts.
const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            LedgerError::Engine(e) => Some(e),
            LedgerError::Store(_) => None,
        }
    }
}

/// Signalled, non-fatal condition of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LedgerWarning {
    /// The mutation went through the non-atomic fallback path.
    DegradedWrite(MaterialId),
}

/// Outcome of a successful ledger mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockMutation {
    pub material_id: MaterialId,
    pub transaction_id: TransactionId,
    pub on_hand: SplitQuantity,
    pub on_hand_flat: f64,
    /// `false` only when a degraded write could not log its transaction.
    pub transaction_logged: bool,
    pub warning: Option<LedgerWarning>,
}

impl StockMutation {
    pub fn is_degraded(&self) -> bool {
        matches!(self.warning, Some(LedgerWarning::DegradedWrite(_)))
    }
}

/// Source of transaction timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant (replays, tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct StockLedger<S, C = SystemClock> {
    store: S,
    clock: C,
    config: EngineConfig,
    /// Serializes degraded read-modify-write cycles per material.
    fallback_locks: Mutex<HashMap<MaterialId, Arc<Mutex<()>>>>,
}

impl<S: StockStore> StockLedger<S, SystemClock> {
    pub fn new(store: S, config: EngineConfig) -> EngineResult<Self> {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: StockStore, C: Clock> StockLedger<S, C> {
    /// Fails with `InvalidReference` when `config` does not validate.
    pub fn with_clock(store: S, config: EngineConfig, clock: C) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
            fallback_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Relative adjustment; kind defaults to `In`/`Out` by the sign of `delta`.
    pub fn adjust(
        &self,
        material_id: &MaterialId,
        delta: f64,
        reason: &str,
        actor: &str,
    ) -> Result<StockMutation, LedgerError> {
        self.adjust_as(material_id, delta, None, reason, actor)
    }

    /// Relative adjustment with an explicit transaction kind (e.g. `Adjust`).
    pub fn adjust_as(
        &self,
        material_id: &MaterialId,
        delta: f64,
        kind: Option<TransactionKind>,
        reason: &str,
        actor: &str,
    ) -> Result<StockMutation, LedgerError> {
        let command = StockCommand::Adjust(AdjustStock {
            transaction_id: TransactionId::new(),
            material_id: material_id.clone(),
            delta,
            kind,
            reason: reason.to_string(),
            actor: actor.to_string(),
            occurred_at: self.clock.now(),
        });
        self.execute(command)
    }

    /// Absolute set after a physical recount.
    pub fn set_count(
        &self,
        material_id: &MaterialId,
        new_on_hand: f64,
        reason: &str,
        actor: &str,
    ) -> Result<StockMutation, LedgerError> {
        let command = StockCommand::SetCount(SetStockCount {
            transaction_id: TransactionId::new(),
            material_id: material_id.clone(),
            new_on_hand,
            reason: reason.to_string(),
            actor: actor.to_string(),
            occurred_at: self.clock.now(),
        });
        self.execute(command)
    }

    pub fn on_hand(&self, material_id: &MaterialId) -> Result<SplitQuantity, LedgerError> {
        let item = self.load_item(material_id)?;
        Ok(SplitQuantity::from_flat(item.on_hand(), self.config.quantity_precision)?)
    }

    pub fn history(&self, material_id: &MaterialId) -> Result<Vec<StockTransaction>, LedgerError> {
        Ok(self.store.transactions(material_id)?)
    }

    /// Recompute on-hand from the transaction log and overwrite the cached figure.
    ///
    /// Returns the rebuilt value. Transactions dropped by degraded writes are
    /// missing from the log, so a rebuild can only recover what was logged. A log
    /// that replays to a negative figure is rejected with `NegativeStock` and the
    /// cached value is left alone.
    pub fn rebuild(&self, material_id: &MaterialId) -> Result<f64, LedgerError> {
        let lock = self.fallback_lock(material_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::Backend("fallback lock poisoned".to_string()))?;

        self.load_item(material_id)?;
        let transactions = self.store.transactions(material_id)?;
        let on_hand = rebuild_on_hand(&transactions, self.config.quantity_precision);
        if on_hand < 0.0 {
            tracing::error!(
                material = %material_id,
                on_hand,
                "transaction log replays to negative stock"
            );
            return Err(EngineError::NegativeStock {
                material_id: material_id.clone(),
                attempted: on_hand,
            }
            .into());
        }
        self.store.write_on_hand(material_id, on_hand)?;
        tracing::info!(
            material = %material_id,
            on_hand,
            transactions = transactions.len(),
            "rebuilt on-hand from transaction log"
        );
        Ok(on_hand)
    }

    fn load_item(&self, material_id: &MaterialId) -> Result<StockItem, LedgerError> {
        let record = self
            .store
            .load(material_id)?
            .ok_or_else(|| EngineError::missing_material(material_id))?;
        Ok(StockItem::from_record(
            material_id.clone(),
            record,
            self.config.quantity_precision,
        ))
    }

    fn decide(&self, command: &StockCommand) -> Result<(StockItem, StockTransaction), LedgerError> {
        let mut item = self.load_item(command.material_id())?;
        let transaction = item
            .handle(command)?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::invalid("stock command produced no transaction"))?;
        let version = item.version();
        item.apply(&transaction);
        tracing::trace!(material = %item.material_id(), version, "stock command decided");
        Ok((item, transaction))
    }

    fn execute(&self, command: StockCommand) -> Result<StockMutation, LedgerError> {
        let material_id = command.material_id().clone();
        let mut attempt = 0;

        loop {
            let (item, transaction) = self.decide(&command)?;
            let expected = ExpectedVersion::Exact(item.version() - 1);

            match self
                .store
                .commit(&material_id, expected, item.on_hand(), &transaction)
            {
                Ok(version) => {
                    tracing::info!(
                        material = %material_id,
                        kind = transaction.kind.as_str(),
                        on_hand = item.on_hand(),
                        version,
                        actor = %transaction.actor,
                        "stock mutation committed"
                    );
                    return self.outcome(&item, &transaction, true, None);
                }
                Err(StoreError::Conflict(msg)) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        material = %material_id,
                        attempt,
                        %msg,
                        "retrying stock commit"
                    );
                }
                Err(StoreError::AtomicUnavailable(reason)) => {
                    if !self.config.allow_degraded_writes {
                        return Err(StoreError::AtomicUnavailable(reason).into());
                    }
                    return self.execute_degraded(&command, &reason);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn execute_degraded(
        &self,
        command: &StockCommand,
        reason: &str,
    ) -> Result<StockMutation, LedgerError> {
        let material_id = command.material_id();
        let lock = self.fallback_lock(material_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::Backend("fallback lock poisoned".to_string()))?;

        // Fresh read under the lock so queued writers see each other's results.
        let (item, transaction) = self.decide(command)?;
        self.store.write_on_hand(material_id, item.on_hand())?;

        let logged = match self.store.append_transaction(&transaction) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    material = %material_id,
                    transaction = %transaction.id,
                    error = %e,
                    "degraded write could not log its transaction"
                );
                false
            }
        };

        tracing::warn!(
            material = %material_id,
            kind = transaction.kind.as_str(),
            on_hand = item.on_hand(),
            reason,
            "stock mutation written through non-atomic fallback"
        );

        self.outcome(
            &item,
            &transaction,
            logged,
            Some(LedgerWarning::DegradedWrite(material_id.clone())),
        )
    }

    fn outcome(
        &self,
        item: &StockItem,
        transaction: &StockTransaction,
        transaction_logged: bool,
        warning: Option<LedgerWarning>,
    ) -> Result<StockMutation, LedgerError> {
        Ok(StockMutation {
            material_id: item.material_id().clone(),
            transaction_id: transaction.id,
            on_hand: SplitQuantity::from_flat(item.on_hand(), self.config.quantity_precision)?,
            on_hand_flat: item.on_hand(),
            transaction_logged,
            warning,
        })
    }

    fn fallback_lock(&self, material_id: &MaterialId) -> Result<Arc<Mutex<()>>, LedgerError> {
        let mut locks = self
            .fallback_locks
            .lock()
            .map_err(|_| StoreError::Backend("fallback lock table poisoned".to_string()))?;
        Ok(locks.entry(material_id.clone()).or_default().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStockStore, StockRecord};
    use crate::transaction::StockChange;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::thread;

    fn material() -> MaterialId {
        MaterialId::new("coffee-beans").unwrap()
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    fn ledger_with(
        store: InMemoryStockStore,
        on_hand: f64,
    ) -> StockLedger<Arc<InMemoryStockStore>, FixedClock> {
        let store = Arc::new(store);
        store.insert(material(), on_hand).unwrap();
        StockLedger::with_clock(store, EngineConfig::default(), FixedClock(fixed_time())).unwrap()
    }

    #[test]
    fn adjust_commits_atomically() {
        let ledger = ledger_with(InMemoryStockStore::new(), 3.0);
        let result = ledger.adjust(&material(), -0.63, "espresso service", "barista").unwrap();

        assert!(!result.is_degraded());
        assert!(result.transaction_logged);
        assert_eq!(result.on_hand.sealed_count, 2);
        assert!((result.on_hand.opened_fraction - 0.37).abs() < 1e-12);

        let history = ledger.history(&material()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::Count);
        assert_eq!(history[1].id, result.transaction_id);
        assert_eq!(history[1].kind, TransactionKind::Out);
        assert_eq!(history[1].actor, "barista");
        assert_eq!(history[1].reason, "espresso service");
        assert_eq!(history[1].occurred_at, fixed_time());
    }

    #[test]
    fn negative_stock_leaves_on_hand_untouched() {
        let ledger = ledger_with(InMemoryStockStore::new(), 3.0);
        let err = ledger.adjust(&material(), -5.0, "spill", "staff").unwrap_err();
        match err.as_engine() {
            Some(EngineError::NegativeStock { attempted, .. }) => assert_eq!(*attempted, -2.0),
            other => panic!("Expected NegativeStock, got {other:?}"),
        }
        assert_eq!(ledger.on_hand(&material()).unwrap().sealed_count, 3);
        assert_eq!(ledger.history(&material()).unwrap().len(), 1);
    }

    #[test]
    fn set_count_is_idempotent() {
        let ledger = ledger_with(InMemoryStockStore::new(), 9.25);
        for _ in 0..2 {
            let result = ledger.set_count(&material(), 4.5, "recount", "manager").unwrap();
            assert_eq!(result.on_hand_flat, 4.5);
        }
        let history = ledger.history(&material()).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[1..].iter().all(|t| t.change == StockChange::SetTo(4.5)));
    }

    #[test]
    fn unknown_material_is_invalid_reference() {
        let ledger = ledger_with(InMemoryStockStore::new(), 1.0);
        let other = MaterialId::new("saffron").unwrap();
        let err = ledger.adjust(&other, 1.0, "delivery", "staff").unwrap_err();
        assert!(matches!(err.as_engine(), Some(EngineError::InvalidReference(_))));
    }

    #[test]
    fn unavailable_atomic_path_falls_back_and_is_flagged() {
        let ledger = ledger_with(InMemoryStockStore::without_atomic_path(), 1.0);
        let result = ledger.adjust(&material(), 2.0, "delivery", "receiving").unwrap();

        assert!(result.is_degraded());
        assert_eq!(result.warning, Some(LedgerWarning::DegradedWrite(material())));
        assert!(result.transaction_logged);
        assert_eq!(ledger.on_hand(&material()).unwrap().sealed_count, 3);
        assert_eq!(ledger.history(&material()).unwrap().len(), 2);
    }

    #[test]
    fn degraded_write_survives_failed_log_write() {
        let store = InMemoryStockStore::without_atomic_path();
        store.set_log_writes_enabled(false);
        let ledger = ledger_with(store, 1.0);

        let result = ledger.adjust(&material(), 1.0, "delivery", "receiving").unwrap();
        assert!(result.is_degraded());
        assert!(!result.transaction_logged);
        assert_eq!(result.on_hand_flat, 2.0);
        assert_eq!(ledger.history(&material()).unwrap().len(), 1);
    }

    #[test]
    fn degraded_writes_can_be_refused() {
        let store = Arc::new(InMemoryStockStore::without_atomic_path());
        store.insert(material(), 1.0).unwrap();
        let config = EngineConfig {
            allow_degraded_writes: false,
            ..EngineConfig::default()
        };
        let ledger = StockLedger::new(store.clone(), config).unwrap();

        let err = ledger.adjust(&material(), 1.0, "delivery", "receiving").unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::AtomicUnavailable(_))));
        assert_eq!(store.load(&material()).unwrap().unwrap().on_hand, 1.0);
    }

    #[test]
    fn degraded_path_still_rejects_negative_stock() {
        let ledger = ledger_with(InMemoryStockStore::without_atomic_path(), 0.5);
        let err = ledger.adjust(&material(), -1.0, "waste", "kitchen").unwrap_err();
        assert!(matches!(err.as_engine(), Some(EngineError::NegativeStock { .. })));
    }

    #[test]
    fn concurrent_adjustments_lose_no_delta() {
        for store in [InMemoryStockStore::new(), InMemoryStockStore::without_atomic_path()] {
            let store = Arc::new(store);
            store.insert(material(), 0.0).unwrap();
            let ledger =
                Arc::new(StockLedger::new(store.clone(), EngineConfig::default()).unwrap());

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = Arc::clone(&ledger);
                    thread::spawn(move || {
                        let mut applied = 0u32;
                        for _ in 0..25 {
                            // Atomic path may exhaust its conflict retries under contention.
                            if ledger.adjust(&material(), 1.0, "delivery", "dock").is_ok() {
                                applied += 1;
                            }
                        }
                        applied
                    })
                })
                .collect();

            let applied: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
            let on_hand = store.load(&material()).unwrap().unwrap().on_hand;
            assert_eq!(on_hand, f64::from(applied));
        }
    }

    #[test]
    fn rebuild_recovers_corrupted_cache() {
        let store = Arc::new(InMemoryStockStore::new());
        store.insert(material(), 0.0).unwrap();
        let ledger = StockLedger::new(store.clone(), EngineConfig::default()).unwrap();

        ledger.adjust(&material(), 5.0, "delivery", "dock").unwrap();
        ledger.adjust(&material(), -1.25, "service", "bar").unwrap();
        ledger.set_count(&material(), 3.5, "recount", "manager").unwrap();
        ledger.adjust(&material(), -0.5, "service", "bar").unwrap();

        store.corrupt_on_hand(&material(), 99.0).unwrap();
        let rebuilt = ledger.rebuild(&material()).unwrap();
        assert_eq!(rebuilt, 3.0);
        assert_eq!(store.load(&material()).unwrap().unwrap().on_hand, 3.0);
    }

    #[test]
    fn rebuild_replays_from_opening_balance() {
        let store = Arc::new(InMemoryStockStore::new());
        store.insert(material(), 10.0).unwrap();
        let ledger = StockLedger::new(store.clone(), EngineConfig::default()).unwrap();

        ledger.adjust(&material(), -2.5, "bread", "kitchen").unwrap();
        store.corrupt_on_hand(&material(), 0.0).unwrap();

        assert_eq!(ledger.rebuild(&material()).unwrap(), 7.5);
        assert_eq!(store.load(&material()).unwrap().unwrap().on_hand, 7.5);
    }

    #[test]
    fn rebuild_refuses_negative_replay() {
        let store = Arc::new(InMemoryStockStore::new());
        store.insert(material(), 1.0).unwrap();
        let ledger = StockLedger::new(store.clone(), EngineConfig::default()).unwrap();
        ledger.adjust(&material(), -0.5, "waste", "kitchen").unwrap();

        let mut bogus = ledger.history(&material()).unwrap().pop().unwrap();
        bogus.id = TransactionId::new();
        bogus.change = StockChange::Delta(-4.0);
        store.append_transaction(&bogus).unwrap();

        match ledger.rebuild(&material()).unwrap_err().as_engine() {
            Some(EngineError::NegativeStock { attempted, .. }) => assert_eq!(*attempted, -3.5),
            other => panic!("Expected NegativeStock, got {other:?}"),
        }
        assert_eq!(store.load(&material()).unwrap().unwrap().on_hand, 0.5);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = EngineConfig {
            quantity_precision: 12,
            ..EngineConfig::default()
        };
        match StockLedger::new(InMemoryStockStore::new(), config) {
            Err(EngineError::InvalidReference(_)) => {}
            Err(other) => panic!("Expected InvalidReference, got {other:?}"),
            Ok(_) => panic!("Expected InvalidReference, got a ledger"),
        }
    }

    /// Store that performs a plain on-hand write right before its next commit.
    struct InterleavedWriteStore {
        inner: InMemoryStockStore,
        pending_delta: Mutex<Option<f64>>,
    }

    impl StockStore for InterleavedWriteStore {
        fn load(&self, material_id: &MaterialId) -> Result<Option<StockRecord>, StoreError> {
            self.inner.load(material_id)
        }

        fn commit(
            &self,
            material_id: &MaterialId,
            expected_version: ExpectedVersion,
            on_hand: f64,
            transaction: &StockTransaction,
        ) -> Result<u64, StoreError> {
            if let Some(delta) = self.pending_delta.lock().unwrap().take() {
                let current = self.inner.load(material_id)?.unwrap().on_hand;
                self.inner.write_on_hand(material_id, current + delta)?;
            }
            self.inner
                .commit(material_id, expected_version, on_hand, transaction)
        }

        fn write_on_hand(&self, material_id: &MaterialId, on_hand: f64) -> Result<(), StoreError> {
            self.inner.write_on_hand(material_id, on_hand)
        }

        fn append_transaction(&self, transaction: &StockTransaction) -> Result<(), StoreError> {
            self.inner.append_transaction(transaction)
        }

        fn transactions(
            &self,
            material_id: &MaterialId,
        ) -> Result<Vec<StockTransaction>, StoreError> {
            self.inner.transactions(material_id)
        }
    }

    #[test]
    fn plain_write_between_load_and_commit_is_not_lost() {
        let store = Arc::new(InterleavedWriteStore {
            inner: InMemoryStockStore::new(),
            pending_delta: Mutex::new(Some(5.0)),
        });
        store.inner.insert(material(), 1.0).unwrap();
        let ledger = StockLedger::new(store.clone(), EngineConfig::default()).unwrap();

        let result = ledger.adjust(&material(), 1.0, "delivery", "dock").unwrap();
        assert!(!result.is_degraded());
        assert_eq!(result.on_hand_flat, 7.0);
        assert_eq!(store.load(&material()).unwrap().unwrap().on_hand, 7.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: two identical recounts leave on-hand at the counted value.
        #[test]
        fn set_count_twice_yields_value(prior in 0.0f64..1000.0, target in 0.0f64..1000.0) {
            let ledger = ledger_with(InMemoryStockStore::new(), prior);
            let first = ledger.set_count(&material(), target, "recount", "manager").unwrap();
            let second = ledger.set_count(&material(), target, "recount", "manager").unwrap();
            prop_assert_eq!(first.on_hand_flat, second.on_hand_flat);
            prop_assert!((second.on_hand_flat - target).abs() < 1e-4);
        }
    }
}
