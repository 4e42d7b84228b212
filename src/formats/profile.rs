//! Profile envelopes from a wire-following profiler.
//!
//! An envelope wraps one block of a profile: an ASCII header declaring the
//! payload length, the payload of fixed-width samples followed by an
//! end-of-profile marker and the profile's time window, then a closing byte.
//!
//! ```text
//! 01 'W' 'E' ccccc '_' LLLL 'u' TTTTTTTT '_' BB 02 | payload (L bytes) | 03
//! ```
//!
//! Each envelope yields one `profile_metadata` particle followed by one
//! `profile_sample` particle per sample, timed by interpolating across the
//! window.

use zerocopy::FromBytes;

use crate::{
    chunker::{Chunk, LengthEncoding, LengthField, PrefixSieve, SievePolicy},
    codec::{DecodeError, Endian, FieldSpec, FieldType::*, RecordShape, read},
    driver::ParserState,
    particle::{Particle, Timestamp, Value, time::Interpolation},
};

use super::{Decoded, Format, Probe};

const MAGIC: &[u8] = b"\x01WE";
const HEADER_LEN: usize = 26;
/// Header and closing byte.
const OVERHEAD: usize = HEADER_LEN + 1;
const CLOSE: u8 = 0x03;

const SAMPLE_LEN: usize = 11;
const MARKER: [u8; SAMPLE_LEN] = [0xFF; SAMPLE_LEN];
/// Marker and time window.
const FOOTER_LEN: usize = SAMPLE_LEN + 8;
const DECIMATION_LEN: usize = 2;

const SAMPLE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("conductivity", U24),
    FieldSpec::new("temperature", U24),
    FieldSpec::new("pressure", U24),
    FieldSpec::new("oxygen", U16),
];

static SAMPLE: RecordShape = RecordShape::new("profile_sample", Endian::Big, SAMPLE_FIELDS);

#[derive(Debug, Clone)]
pub struct Profile {
    sieve: PrefixSieve,
}

impl Profile {
    pub fn new() -> Self {
        let length = LengthField {
            offset: 9,
            width: 4,
            encoding: LengthEncoding::AsciiHex,
        };

        Self {
            sieve: PrefixSieve::new(MAGIC, length, OVERHEAD).with_terminator(&[CLOSE]),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C, packed)]
#[derive(FromBytes)]
struct Header {
    start: u8,
    family: [u8; 2],
    controller: [u8; 5],
    _sep0: u8,
    length: [u8; 4],
    mode: u8,
    block_time: [u8; 8],
    _sep1: u8,
    block: [u8; 2],
    open: u8,
}

fn hex(r: &[u8], field: &str) -> Result<u32, DecodeError> {
    std::str::from_utf8(r)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| DecodeError::Malformed(format!("{field} is not hexadecimal")))
}

impl Format for Profile {
    fn sieve(&self, _: &ParserState) -> SievePolicy {
        SievePolicy::LengthPrefixed(self.sieve.clone())
    }

    fn decode(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        _: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError> {
        let r = chunk.bytes;

        let header: [u8; HEADER_LEN] = r
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(DecodeError::Truncated {
                needed: OVERHEAD,
                available: r.len(),
            })?;

        let Header {
            start,
            family,
            controller,
            length,
            mode,
            block_time,
            block,
            open,
            ..
        } = zerocopy::transmute!(header);

        if start != MAGIC[0] || family != MAGIC[1..] || mode != b'u' || open != 0x02 {
            Err(DecodeError::Malformed("incorrect envelope header".into()))?;
        }

        if !controller.iter().all(u8::is_ascii_digit) {
            Err(DecodeError::Malformed("controller id is not numeric".into()))?;
        }

        let length = hex(&length, "payload length")? as usize;
        let block_time = hex(&block_time, "block time")?;
        let block = hex(&block, "block number")?;

        if r.len() != length + OVERHEAD || r.last() != Some(&CLOSE) {
            Err(DecodeError::Malformed(format!(
                "envelope of {} bytes does not frame a {length} byte payload",
                r.len()
            )))?;
        }

        let payload = &r[HEADER_LEN..HEADER_LEN + length];

        let (count, decimated) = layout(length)?;
        let footer = count * SAMPLE_LEN;

        if payload[footer..footer + SAMPLE_LEN] != MARKER {
            Err(DecodeError::Malformed("missing end-of-profile marker".into()))?;
        }

        let time_on = read::<u32>(payload, footer + SAMPLE_LEN, Endian::Big)?;
        let time_off = read::<u32>(payload, footer + SAMPLE_LEN + 4, Endian::Big)?;

        if time_off < time_on {
            Err(DecodeError::Malformed(format!(
                "time window ends ({time_off}) before it starts ({time_on})"
            )))?;
        }

        let window = Interpolation {
            start: Timestamp::from_unix_seconds(time_on.into()),
            end: Timestamp::from_unix_seconds(time_off.into()),
            count: count as u32,
        };

        let mut values = vec![
            (
                "controller_id",
                Value::Text(String::from_utf8_lossy(&controller).into_owned()),
            ),
            ("block_number", Value::UInt(block.into())),
            ("block_time", Value::UInt(block_time.into())),
            ("time_on", Value::UInt(time_on.into())),
            ("time_off", Value::UInt(time_off.into())),
            ("number_of_records", Value::UInt(count as u64)),
        ];

        if decimated {
            let factor = read::<u16>(payload, footer + FOOTER_LEN, Endian::Big)?;
            values.push(("decimation_factor", Value::UInt(factor.into())));
        }

        let mut particles = Vec::with_capacity(count + 1);
        particles.push(Particle::new("profile_metadata", values, window.start));

        for (i, sample) in payload[..footer].chunks_exact(SAMPLE_LEN).enumerate() {
            particles.push(Particle::new(
                SAMPLE.kind(),
                SAMPLE.decode(sample)?,
                window.at(i as u32),
            ));
        }

        Ok(Decoded {
            particles,
            state: state.clone(),
        })
    }
}

/// The number of samples in a payload, and whether a decimation factor
/// follows the time window.
fn layout(length: usize) -> Result<(usize, bool), DecodeError> {
    let fits = |footer: usize| {
        length
            .checked_sub(footer)
            .filter(|samples| samples % SAMPLE_LEN == 0)
            .map(|samples| samples / SAMPLE_LEN)
    };

    match (fits(FOOTER_LEN), fits(FOOTER_LEN + DECIMATION_LEN)) {
        (Some(count), _) => Ok((count, false)),
        (None, Some(count)) => Ok((count, true)),
        (None, None) => Err(DecodeError::Malformed(format!(
            "payload of {length} bytes is not a whole number of samples"
        ))),
    }
}
