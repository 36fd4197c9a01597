//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. Two
/// `Money` amounts of 60.00 are the same amount; two invoices with identical
/// totals are still different invoices (those are entities, see [`crate::Entity`]).
///
/// To "modify" a value object, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
