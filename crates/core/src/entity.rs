//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Materials and stock transactions are entities: two records with the same id are
/// the same thing even when their attributes differ (e.g. a repriced material).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
