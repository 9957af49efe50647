use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use thiserror::Error;

use larder_core::{ExpectedVersion, MaterialId};

use crate::transaction::StockTransaction;

/// Cached on-hand figure of one material plus its optimistic-concurrency version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockRecord {
    pub on_hand: f64,
    /// Bumped by every write of `on_hand`, atomic or not.
    pub version: u64,
}

/// Backing store operation error.
///
/// These are **infrastructure errors** as opposed to engine errors (negative stock,
/// invalid input).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// The atomic mutation-plus-log path is not available (e.g. procedure missing).
    #[error("atomic write path unavailable: {0}")]
    AtomicUnavailable(String),

    /// Optimistic concurrency check failed.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Host-controlled persistence for on-hand figures and the transaction log.
///
/// `commit` is the preferred path: it must write the new on-hand and the transaction
/// together or not at all. `write_on_hand` + `append_transaction` form the degraded
/// fallback, used only when `commit` reports `AtomicUnavailable`.
///
/// Every write of on-hand, including `write_on_hand`, must increment the record's
/// version. A commit decided against an older version then fails with `Conflict`
/// instead of overwriting the newer figure.
///
/// Registering a material must log its opening balance as an absolute `Count`
/// transaction so the log alone can rebuild on-hand.
pub trait StockStore: Send + Sync {
    fn load(&self, material_id: &MaterialId) -> Result<Option<StockRecord>, StoreError>;

    /// Atomically set on-hand and append `transaction`, returning the new version.
    fn commit(
        &self,
        material_id: &MaterialId,
        expected_version: ExpectedVersion,
        on_hand: f64,
        transaction: &StockTransaction,
    ) -> Result<u64, StoreError>;

    /// Fallback step 1: plain write of on-hand. Bumps the version.
    fn write_on_hand(&self, material_id: &MaterialId, on_hand: f64) -> Result<(), StoreError>;

    /// Fallback step 2: best-effort log write.
    fn append_transaction(&self, transaction: &StockTransaction) -> Result<(), StoreError>;

    /// Transactions of one material in write order.
    fn transactions(&self, material_id: &MaterialId) -> Result<Vec<StockTransaction>, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn load(&self, material_id: &MaterialId) -> Result<Option<StockRecord>, StoreError> {
        (**self).load(material_id)
    }

    fn commit(
        &self,
        material_id: &MaterialId,
        expected_version: ExpectedVersion,
        on_hand: f64,
        transaction: &StockTransaction,
    ) -> Result<u64, StoreError> {
        (**self).commit(material_id, expected_version, on_hand, transaction)
    }

    fn write_on_hand(&self, material_id: &MaterialId, on_hand: f64) -> Result<(), StoreError> {
        (**self).write_on_hand(material_id, on_hand)
    }

    fn append_transaction(&self, transaction: &StockTransaction) -> Result<(), StoreError> {
        (**self).append_transaction(transaction)
    }

    fn transactions(&self, material_id: &MaterialId) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).transactions(material_id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<MaterialId, StockRecord>,
    log: Vec<StockTransaction>,
}

/// In-memory stock store.
///
/// Intended for tests/dev. The atomic path and log writes can be switched off to
/// exercise the ledger's degraded fallback.
#[derive(Debug)]
pub struct InMemoryStockStore {
    inner: RwLock<Inner>,
    atomic_enabled: AtomicBool,
    log_writes_enabled: AtomicBool,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            atomic_enabled: AtomicBool::new(true),
            log_writes_enabled: AtomicBool::new(true),
        }
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `commit` always reports `AtomicUnavailable`.
    pub fn without_atomic_path() -> Self {
        let store = Self::default();
        store.set_atomic_enabled(false);
        store
    }

    pub fn set_atomic_enabled(&self, enabled: bool) {
        self.atomic_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Make `append_transaction` fail (the degraded path's best-effort step).
    pub fn set_log_writes_enabled(&self, enabled: bool) {
        self.log_writes_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Register a material and log its opening on-hand figure.
    ///
    /// The opening record is written even while log writes are switched off.
    pub fn insert(&self, material_id: MaterialId, on_hand: f64) -> Result<(), StoreError> {
        if !on_hand.is_finite() || on_hand < 0.0 {
            return Err(StoreError::Backend(format!(
                "opening balance of '{material_id}' must be a non-negative number, got {on_hand}"
            )));
        }
        let opening = StockTransaction::opening(material_id.clone(), on_hand, Utc::now());
        let mut inner = self.write()?;
        inner
            .records
            .insert(material_id, StockRecord { on_hand, version: 0 });
        inner.log.push(opening);
        Ok(())
    }

    /// Overwrite the cached figure without touching the log (simulates corruption).
    pub fn corrupt_on_hand(
        &self,
        material_id: &MaterialId,
        on_hand: f64,
    ) -> Result<(), StoreError> {
        self.write_on_hand(material_id, on_hand)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl StockStore for InMemoryStockStore {
    fn load(&self, material_id: &MaterialId) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.read()?.records.get(material_id).copied())
    }

    fn commit(
        &self,
        material_id: &MaterialId,
        expected_version: ExpectedVersion,
        on_hand: f64,
        transaction: &StockTransaction,
    ) -> Result<u64, StoreError> {
        if !self.atomic_enabled.load(Ordering::SeqCst) {
            return Err(StoreError::AtomicUnavailable(
                "atomic stock update is disabled".to_string(),
            ));
        }
        if &transaction.material_id != material_id {
            return Err(StoreError::Backend(format!(
                "transaction for '{}' committed against '{material_id}'",
                transaction.material_id
            )));
        }

        let mut inner = self.write()?;
        let record = inner
            .records
            .get_mut(material_id)
            .ok_or_else(|| StoreError::Backend(format!("no stock record for '{material_id}'")))?;

        if !expected_version.matches(record.version) {
            return Err(StoreError::Conflict(format!(
                "expected {expected_version:?}, found {}",
                record.version
            )));
        }

        // Both writes happen under one lock: all or nothing.
        record.on_hand = on_hand;
        record.version += 1;
        let version = record.version;
        inner.log.push(transaction.clone());
        Ok(version)
    }

    fn write_on_hand(&self, material_id: &MaterialId, on_hand: f64) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let record = inner
            .records
            .get_mut(material_id)
            .ok_or_else(|| StoreError::Backend(format!("no stock record for '{material_id}'")))?;
        record.on_hand = on_hand;
        record.version += 1;
        Ok(())
    }

    fn append_transaction(&self, transaction: &StockTransaction) -> Result<(), StoreError> {
        if !self.log_writes_enabled.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("transaction log unavailable".to_string()));
        }
        self.write()?.log.push(transaction.clone());
        Ok(())
    }

    fn transactions(&self, material_id: &MaterialId) -> Result<Vec<StockTransaction>, StoreError> {
        Ok(self
            .read()?
            .log
            .iter()
            .filter(|t| &t.material_id == material_id)
            .cloned()
            .collect())
    }
}
