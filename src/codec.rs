//! Stateless decoding and verification of instrument records.
//!
//! Nothing in this module holds state between calls. Routines take a record's
//! bytes and either return decoded values or a [`DecodeError`], which the
//! driver reports as a recoverable sample error.

pub mod check;
pub mod field;
pub mod shape;

use thiserror::Error;

pub use check::{ChecksumRule, Region};
pub use field::{Endian, FieldType, read, read_u24};
pub use shape::{FieldSpec, RecordShape};

/// An error decoding or verifying a single record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The record ended before a field could be read.
    #[error("Record truncated: needed {needed} bytes, found {available}.")]
    Truncated { needed: usize, available: usize },
    /// Calculated and found checksum values do not match.
    #[error("Calculated ({calculated:#06x}) and found ({found:#06x}) checksums do not match.")]
    Checksum { found: u16, calculated: u16 },
    /// A zero-sum checksum region did not sum to zero.
    #[error("Checksum region sums to {residual:#04x} rather than zero.")]
    NonZeroSum { residual: u8 },
    /// The record is structurally inconsistent.
    #[error("Malformed record: {0}.")]
    Malformed(String),
    /// A timestamp could not be derived.
    #[error("Invalid timestamp: {0}.")]
    Timestamp(String),
    /// No record shape is registered for the discriminator.
    #[error("Unknown record kind: {0}.")]
    UnknownKind(String),
    /// Reading ahead in the stream failed.
    #[error("Stream probe failed: {0}.")]
    Probe(String),
}
