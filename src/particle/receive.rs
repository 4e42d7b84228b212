//! Receiver traits for moving particles into typed structs.
//!
//! See the [`FromParticles`](macro@super::FromParticles) and
//! [`FromParticle`](macro@super::FromParticle) derive macros for automatic
//! implementations.

use super::Timestamp;

/// Produce particle receivers by kind.
pub trait FromParticles {
    /// Retrieve a receiver for a particle of `kind`, if one exists.
    fn add_particle(&mut self, kind: &str) -> Option<&mut dyn FromParticle>;
}

/// Receive the timestamp and field values of a particle.
///
/// List values are published item by item, calling the receiver repeatedly
/// with the same field name.
///
/// The default implementation of each method ignores received values.
#[allow(unused_variables)]
pub trait FromParticle {
    /// Add the particle's timestamp.
    fn add_timestamp(&mut self, _: Timestamp) {}
    /// Add an unsigned integer value for a field.
    fn add_u64(&mut self, field: &str, _: u64) {}
    /// Add a signed integer value for a field.
    fn add_i64(&mut self, field: &str, _: i64) {}
    /// Add a floating point value for a field.
    fn add_f64(&mut self, field: &str, _: f64) {}
    /// Add a boolean value for a field.
    fn add_bool(&mut self, field: &str, _: bool) {}
    /// Add a text value for a field.
    fn add_text(&mut self, field: &str, _: &str) {}
}
