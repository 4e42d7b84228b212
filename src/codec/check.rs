//! Helpers for computing and verifying record checksums.

use super::{DecodeError, Endian, read};

/// Accumulate a slice of bytes into a wrapping 16-bit sum.
pub fn sum16(r: &[u8]) -> u16 {
    r.iter().fold(0, |acc, b| acc.wrapping_add(u16::from(*b)))
}

/// Accumulate a slice of bytes into an 8-bit sum, modulo 256.
pub fn sum8(r: &[u8]) -> u8 {
    r.iter().fold(0, |acc, b| acc.wrapping_add(*b))
}

/// Sum a slice of bytes at full width, then mask the total to 16 bits.
pub fn masked_sum16(r: &[u8]) -> u16 {
    let total: u64 = r.iter().map(|b| u64::from(*b)).sum();
    (total & 0xFFFF) as u16
}

/// A checksummed region of a record: from `start` up to `trailing` bytes
/// before the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub trailing: usize,
}

impl Region {
    /// The region covering everything but the last `trailing` bytes.
    pub const fn trailing(trailing: usize) -> Self {
        Self { start: 0, trailing }
    }

    fn bounds(&self, r: &[u8]) -> Result<(usize, usize), DecodeError> {
        let end = r.len().checked_sub(self.trailing).filter(|end| *end >= self.start);

        end.map(|end| (self.start, end))
            .ok_or(DecodeError::Truncated {
                needed: self.start + self.trailing,
                available: r.len(),
            })
    }
}

/// How a record proves its own integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumRule {
    /// A wrapping 16-bit sum of the region, stored in the two bytes directly
    /// after it.
    Sum16 { region: Region, endian: Endian },
    /// The region, checksum byte included, sums to zero modulo 256.
    ZeroSum8 { region: Region },
    /// The region's byte sum masked to 16 bits, stored in the two bytes
    /// directly after it.
    MaskedSum16 { region: Region, endian: Endian },
}

impl ChecksumRule {
    /// Verify a complete record against the rule.
    pub fn verify(&self, r: &[u8]) -> Result<(), DecodeError> {
        match *self {
            Self::Sum16 { region, endian } => {
                let (start, end) = region.bounds(r)?;
                let found = read::<u16>(r, end, endian)?;
                let calculated = sum16(&r[start..end]);
                compare(found, calculated)
            }
            Self::MaskedSum16 { region, endian } => {
                let (start, end) = region.bounds(r)?;
                let found = read::<u16>(r, end, endian)?;
                let calculated = masked_sum16(&r[start..end]);
                compare(found, calculated)
            }
            Self::ZeroSum8 { region } => {
                let (start, end) = region.bounds(r)?;
                match sum8(&r[start..end]) {
                    0 => Ok(()),
                    residual => Err(DecodeError::NonZeroSum { residual }),
                }
            }
        }
    }
}

fn compare(found: u16, calculated: u16) -> Result<(), DecodeError> {
    if found != calculated {
        Err(DecodeError::Checksum { found, calculated })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit_sum_wraps() {
        let r = vec![0xFF; 300];
        assert_eq!(sum16(&r), (300u32 * 0xFF % 0x1_0000) as u16);
        assert_eq!(masked_sum16(&r), sum16(&r));
        assert_eq!(sum16(&[]), 0);
    }

    #[test]
    fn trailing_sum16_verifies() {
        let mut record = vec![0xCB, 0x01, 0x02, 0x03];
        let sum = sum16(&record);
        record.extend_from_slice(&sum.to_be_bytes());

        let rule = ChecksumRule::Sum16 {
            region: Region::trailing(2),
            endian: Endian::Big,
        };
        assert_eq!(rule.verify(&record), Ok(()));

        record[4] ^= 0x01;
        assert!(matches!(
            rule.verify(&record),
            Err(DecodeError::Checksum { .. })
        ));
    }

    #[test]
    fn zero_sum_region_excludes_prefix_and_suffix() {
        // Text prefix and line terminator are outside the region.
        let mut record = b"abc".to_vec();
        let body = [0x10u8, 0x20, 0x30];
        record.extend_from_slice(&body);
        record.push(0u8.wrapping_sub(sum8(&body)));
        record.extend_from_slice(b"\r\n");

        let rule = ChecksumRule::ZeroSum8 {
            region: Region {
                start: 3,
                trailing: 2,
            },
        };
        assert_eq!(rule.verify(&record), Ok(()));

        record[4] = 0x21;
        assert_eq!(
            rule.verify(&record),
            Err(DecodeError::NonZeroSum { residual: 0x01 })
        );
    }

    #[test]
    fn masked_sum_skips_pad_byte() {
        let mut record = vec![0xFF, 0x00, 0xFF, 0x00, 0x7F];
        let sum = masked_sum16(&record);
        record.extend_from_slice(&sum.to_be_bytes());
        record.push(0x00);

        let rule = ChecksumRule::MaskedSum16 {
            region: Region::trailing(3),
            endian: Endian::Big,
        };
        assert_eq!(rule.verify(&record), Ok(()));
    }

    #[test]
    fn region_longer_than_record_is_truncation() {
        let rule = ChecksumRule::ZeroSum8 {
            region: Region {
                start: 4,
                trailing: 2,
            },
        };
        assert!(matches!(
            rule.verify(&[0; 5]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
