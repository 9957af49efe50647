//! Value object trait: equality by value, not identity.
//!
//! Cost breakdowns and split quantities are value objects: they are results of a
//! computation, defined entirely by their attribute values.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// compute a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct SplitQuantity {
///     sealed_count: u64,
///     opened_fraction: f64,
/// }
///
/// impl ValueObject for SplitQuantity {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
