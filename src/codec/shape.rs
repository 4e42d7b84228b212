//! Record shapes: ordered field layouts shared read-only between sessions.

use std::borrow::Cow;

use super::{DecodeError, Endian, FieldType};
use crate::particle::Value;

/// A named field of a record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

impl FieldSpec {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// The layout of one kind of record.
///
/// Shapes are configuration: they are built once, at construction, and never
/// mutated. Layouts known in advance borrow a static field table; layouts
/// chosen at run time by [`RecordShape::select`] own their subset.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordShape {
    kind: &'static str,
    endian: Endian,
    fields: Cow<'static, [FieldSpec]>,
}

impl RecordShape {
    /// A shape over a static field table.
    pub const fn new(kind: &'static str, endian: Endian, fields: &'static [FieldSpec]) -> Self {
        Self {
            kind,
            endian,
            fields: Cow::Borrowed(fields),
        }
    }

    /// Build the shape of a record whose present fields are chosen by a
    /// one-time vector of flags, one per entry of `table`.
    ///
    /// Returns the ordered subset of enabled fields. The flag vector must be
    /// exactly as long as the table.
    pub fn select(
        kind: &'static str,
        endian: Endian,
        table: &'static [FieldSpec],
        flags: &[bool],
    ) -> Result<Self, DecodeError> {
        if flags.len() != table.len() {
            Err(DecodeError::Malformed(format!(
                "expected {} field flags, found {}",
                table.len(),
                flags.len()
            )))?;
        }

        let fields = table
            .iter()
            .zip(flags)
            .filter(|(_, enabled)| **enabled)
            .map(|(field, _)| *field)
            .collect::<Vec<_>>();

        Ok(Self {
            kind,
            endian,
            fields: Cow::Owned(fields),
        })
    }

    /// The particle kind tag of records with this shape.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Total bytes occupied by the fields.
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.ty.width()).sum()
    }

    /// Decode every field, in order, from the start of `r`.
    ///
    /// Bytes beyond [`Self::width`] are ignored.
    pub fn decode(&self, r: &[u8]) -> Result<Vec<(&'static str, Value)>, DecodeError> {
        let mut offset = 0;

        self.fields
            .iter()
            .map(|field| {
                let value = field.ty.decode(r, offset, self.endian)?;
                offset += field.ty.width();
                Ok((field.name, value))
            })
            .collect()
    }
}
