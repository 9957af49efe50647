//! `larder-core`: shared building blocks for the costing and stock engines.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod config;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use config::EngineConfig;
pub use entity::Entity;
pub use error::{CyclePath, EngineError, EngineResult};
pub use id::{MaterialId, TransactionId};
pub use value_object::ValueObject;
