//! Decoded, timestamped records.
//!
//! A [`Particle`] is built once from a decoded field mapping, a kind tag and a
//! [`Timestamp`], and never changes afterward. Field order is the order of the
//! record layout.
//!
//! To move particles into typed structs, implement (or derive) the receiver
//! traits in [`receive`] and call [`Particle::publish`].

pub mod receive;
pub mod time;

use serde::{Serialize, Serializer, ser::SerializeMap};

pub use receive::{FromParticle, FromParticles};
pub use time::Timestamp;

/// Derive [`FromParticles`] for a struct collecting particles by kind.
///
/// _Requires Cargo feature `derive`._
///
/// Add the `particle("kind")` attribute to an `Option<T>` field to keep the
/// latest particle of a kind, or to a `Vec<T>` field to keep all of them,
/// where `T` implements [`FromParticle`] and [`Default`].
///
/// ```
/// # use mooring::particle::{FromParticle, FromParticles};
/// # #[derive(Debug, Default, FromParticle)]
/// # struct ProfileMetadata {}
/// # #[derive(Debug, Default, FromParticle)]
/// # struct ProfileSample {}
/// #[derive(Debug, Default, FromParticles)]
/// struct Profile {
///     #[particle("profile_metadata")]
///     metadata: Option<ProfileMetadata>,
///     #[particle("profile_sample")]
///     samples: Vec<ProfileSample>,
/// }
/// ```
#[cfg(feature = "derive")]
pub use mooring_derive::FromParticles;

/// Derive [`FromParticle`] for a struct representing one particle.
///
/// _Requires Cargo feature `derive`._
///
/// Add the `field("name")` attribute to an `Option<T>` field, where `T` is one
/// of `u64`, `i64`, `f64`, `bool` or `String`. To receive the timestamp, use
/// `field(time)` on an `Option<Timestamp>`. List values are published item by
/// item; collect them with an accumulator closure whose second argument is
/// typed.
///
/// ```
/// # use mooring::particle::{FromParticle, Timestamp};
/// #[derive(Debug, Default, FromParticle)]
/// struct SpectralSample {
///     #[field(time)]
///     time: Option<Timestamp>,
///     #[field("elapsed_ms")]
///     elapsed_ms: Option<u64>,
///     #[field("c_signal", |v, c: u64| v.push(c))]
///     c_signal: Vec<u64>,
/// }
/// ```
#[cfg(feature = "derive")]
pub use mooring_derive::FromParticle;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    fn publish(&self, field: &str, o: &mut dyn FromParticle) {
        match self {
            Self::UInt(v) => o.add_u64(field, *v),
            Self::Int(v) => o.add_i64(field, *v),
            Self::Float(v) => o.add_f64(field, *v),
            Self::Bool(v) => o.add_bool(field, *v),
            Self::Text(v) => o.add_text(field, v),
            Self::List(items) => items.iter().for_each(|item| item.publish(field, o)),
        }
    }
}

/// A single decoded, timestamped, typed record.
///
/// Two particles are equal when their kinds and field values are identical
/// and their timestamps agree within [`Timestamp::TOLERANCE`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Particle {
    kind: &'static str,
    timestamp: Timestamp,
    #[serde(serialize_with = "ordered_map")]
    values: Vec<(&'static str, Value)>,
}

impl Particle {
    pub fn new(kind: &'static str, values: Vec<(&'static str, Value)>, timestamp: Timestamp) -> Self {
        Self {
            kind,
            timestamp,
            values,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Field values in record order.
    pub fn values(&self) -> &[(&'static str, Value)] {
        &self.values
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Publish the particle to a receiver, if it accepts this kind.
    pub fn publish<O: FromParticles + ?Sized>(&self, o: &mut O) {
        let Some(o) = o.add_particle(self.kind) else {
            return;
        };

        o.add_timestamp(self.timestamp);

        for (name, value) in &self.values {
            value.publish(name, o);
        }
    }
}

fn ordered_map<S: Serializer>(values: &[(&'static str, Value)], s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(values.len()))?;
    for (name, value) in values {
        map.serialize_entry(name, value)?;
    }
    map.end()
}
