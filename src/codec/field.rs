//! Fixed-width integer and float fields.

use serde::{Deserialize, Serialize};

use super::DecodeError;
use crate::particle::Value;

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    Big,
    Little,
}

/// A primitive decodable from a fixed number of bytes.
pub trait Primitive: Sized {
    /// Number of bytes storing the primitive.
    const SIZE: usize;

    /// Convert exactly [`Self::SIZE`] bytes to the primitive.
    fn from_bytes(r: &[u8], endian: Endian) -> Self;
}

macro_rules! primitive {
    ($($t:ty),*) => {$(
        impl Primitive for $t {
            const SIZE: usize = size_of::<$t>();

            fn from_bytes(r: &[u8], endian: Endian) -> Self {
                let mut buf = [0; size_of::<$t>()];
                buf.copy_from_slice(r);

                match endian {
                    Endian::Big => <$t>::from_be_bytes(buf),
                    Endian::Little => <$t>::from_le_bytes(buf),
                }
            }
        }
    )*};
}

primitive!(u8, u16, u32, i8, i16, i32, f32, f64);

/// Read a primitive at an offset in a record.
pub fn read<T: Primitive>(r: &[u8], offset: usize, endian: Endian) -> Result<T, DecodeError> {
    Ok(T::from_bytes(take(r, offset, T::SIZE)?, endian))
}

/// Read a three-byte unsigned integer at an offset in a record.
pub fn read_u24(r: &[u8], offset: usize, endian: Endian) -> Result<u32, DecodeError> {
    let b = take(r, offset, 3)?;

    Ok(match endian {
        Endian::Big => u32::from_be_bytes([0, b[0], b[1], b[2]]),
        Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], 0]),
    })
}

fn take(r: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    r.get(offset..offset + len).ok_or(DecodeError::Truncated {
        needed: offset + len,
        available: r.len(),
    })
}

/// The storage type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    U8,
    U16,
    U24,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl FieldType {
    /// Number of bytes the field occupies.
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U24 => 3,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Decode the field at an offset in a record.
    pub fn decode(self, r: &[u8], offset: usize, endian: Endian) -> Result<Value, DecodeError> {
        Ok(match self {
            Self::U8 => Value::UInt(read::<u8>(r, offset, endian)?.into()),
            Self::U16 => Value::UInt(read::<u16>(r, offset, endian)?.into()),
            Self::U24 => Value::UInt(read_u24(r, offset, endian)?.into()),
            Self::U32 => Value::UInt(read::<u32>(r, offset, endian)?.into()),
            Self::I8 => Value::Int(read::<i8>(r, offset, endian)?.into()),
            Self::I16 => Value::Int(read::<i16>(r, offset, endian)?.into()),
            Self::I32 => Value::Int(read::<i32>(r, offset, endian)?.into()),
            Self::F32 => Value::Float(read::<f32>(r, offset, endian)?.into()),
            Self::F64 => Value::Float(read::<f64>(r, offset, endian)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_byte_orders() {
        let r = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read::<u16>(&r, 1, Endian::Big).unwrap(), 0x3456);
        assert_eq!(read::<u16>(&r, 1, Endian::Little).unwrap(), 0x5634);
        assert_eq!(read::<u32>(&r, 0, Endian::Big).unwrap(), 0x1234_5678);
        assert_eq!(read_u24(&r, 1, Endian::Big).unwrap(), 0x34_5678);
        assert_eq!(read_u24(&r, 0, Endian::Little).unwrap(), 0x56_3412);
    }

    #[test]
    fn signed_and_float_fields() {
        let r = [0xFF, 0xFE];
        assert_eq!(FieldType::I16.decode(&r, 0, Endian::Big).unwrap(), Value::Int(-2));
        assert_eq!(FieldType::I8.decode(&r, 0, Endian::Big).unwrap(), Value::Int(-1));

        let r = 1.5f32.to_be_bytes();
        assert_eq!(FieldType::F32.decode(&r, 0, Endian::Big).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn truncated_field_is_an_error() {
        let r = [0u8; 3];
        assert_eq!(
            read::<u32>(&r, 0, Endian::Big),
            Err(DecodeError::Truncated {
                needed: 4,
                available: 3
            })
        );
        assert!(FieldType::U16.decode(&r, 2, Endian::Little).is_err());
    }
}
