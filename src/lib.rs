//! A resumable record-parsing engine for oceanographic instrument logs.
//!
//! Mooring recovers records from raw instrument byte streams (binary
//! telemetry, mixed text/binary logger output, multiplexed envelopes),
//! validates them, and converts them into timestamped [`Particle`]s. Parsing
//! can stop at any record boundary and resume later from a persisted
//! [`ParserState`] with identical output.
//!
//! The engine is split into four layers:
//!
//! - [`codec`]: stateless field decoding, checksums and record shapes.
//! - [`chunker`]: a growable buffer scanned by a pluggable [`SievePolicy`].
//! - [`driver`]: the pull-based decode loop, state persistence and error
//!   classification.
//! - [`particle`]: decoded records and timestamp derivation.
//!
//! Instrument families live in [`formats`]; most users should begin with
//! [`FormatConfig`] and [`Driver`].
//!
//! ## Cargo Features
//!
//! - `derive`: enable the [`FromParticle`](macro@particle::FromParticle) and
//!   [`FromParticles`](macro@particle::FromParticles) derive macros (default).

pub mod chunker;
pub mod codec;
pub mod driver;
pub mod error;
pub mod formats;
pub mod particle;

pub use chunker::{Chunk, Chunker, NonDataSpan, SievePolicy};
pub use driver::{Callbacks, Driver, DriverConfig, ParserState};
pub use error::{Condition, Error};
pub use formats::{AnyFormat, Format, FormatConfig};
pub use particle::{Particle, Timestamp, Value};
