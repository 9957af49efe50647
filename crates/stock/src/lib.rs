//! Stock ledger.
//!
//! Holds each material's on-hand quantity as sealed units plus an opened fraction,
//! and mutates it through relative adjustments and absolute recounts. Every mutation
//! writes an immutable [`StockTransaction`]; the backing store is injected through the
//! [`StockStore`] trait so hosts own persistence.

pub mod item;
pub mod ledger;
pub mod quantity;
pub mod report;
pub mod store;
pub mod transaction;

pub use item::{AdjustStock, SetStockCount, StockCommand, StockItem};
pub use ledger::{
    Clock, FixedClock, LedgerError, LedgerWarning, StockLedger, StockMutation, SystemClock,
};
pub use quantity::{
    DEFAULT_PRECISION, SplitQuantity, StockDisplay, compose_from_percent, compose_quantity,
    compose_quantity_with, split_quantity,
};
pub use report::{StockLevel, StockThresholds, UsageSummary, rebuild_on_hand, usage_report};
pub use store::{InMemoryStockStore, StockRecord, StockStore, StoreError};
pub use transaction::{StockChange, StockTransaction, TransactionKind};
