//! Tag-framed inertial measurement records.
//!
//! Each record starts with a tag byte selecting its layout and ends with a
//! wrapping 16-bit sum of every preceding byte. Records carry a free-running
//! 62.5 kHz timer, anchored to the session origin encoded in the source name
//! by its first reading.

use crate::{
    Error,
    chunker::{Chunk, SievePolicy, TagSpec, TaggedSieve},
    codec::{
        ChecksumRule, DecodeError, Endian, FieldSpec, FieldType::*, RecordShape, Region, read,
    },
    driver::ParserState,
    particle::{
        Particle, Timestamp,
        time::{CounterClock, origin_from_source_name},
    },
};

use super::{Decoded, Format, Probe};

/// Tag of acceleration, angular rate and magnetometer records.
pub const ACCEL_RATE_MAG_TAG: u8 = 0xCB;
/// Tag of Euler angle and angular rate records.
pub const EULER_RATE_TAG: u8 = 0xCF;

/// Timer ticks per second.
pub const TICK_RATE: f64 = 62_500.0;

const CHECKSUM: ChecksumRule = ChecksumRule::Sum16 {
    region: Region::trailing(2),
    endian: Endian::Big,
};

const ACCEL_RATE_MAG_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("accel_x", F32),
    FieldSpec::new("accel_y", F32),
    FieldSpec::new("accel_z", F32),
    FieldSpec::new("angular_rate_x", F32),
    FieldSpec::new("angular_rate_y", F32),
    FieldSpec::new("angular_rate_z", F32),
    FieldSpec::new("magnetometer_x", F32),
    FieldSpec::new("magnetometer_y", F32),
    FieldSpec::new("magnetometer_z", F32),
    FieldSpec::new("timer", U32),
];

static ACCEL_RATE_MAG: RecordShape =
    RecordShape::new("imu_accel_rate_mag", Endian::Big, ACCEL_RATE_MAG_FIELDS);

const EULER_RATE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("roll", F32),
    FieldSpec::new("pitch", F32),
    FieldSpec::new("yaw", F32),
    FieldSpec::new("angular_rate_x", F32),
    FieldSpec::new("angular_rate_y", F32),
    FieldSpec::new("angular_rate_z", F32),
    FieldSpec::new("timer", U32),
];

static EULER_RATE: RecordShape = RecordShape::new("imu_euler_rate", Endian::Big, EULER_RATE_FIELDS);

/// Total record width: tag, fields and checksum.
fn width(shape: &RecordShape) -> usize {
    1 + shape.width() + 2
}

#[derive(Debug, Clone)]
pub struct Imu {
    origin: Timestamp,
    sieve: TaggedSieve,
}

impl Imu {
    /// Build the format for a stream whose session origin is encoded in its
    /// source name, as `YYYYMMDD_HHMMSS`.
    pub fn new(source_name: &str) -> Result<Self, Error> {
        let origin = origin_from_source_name(source_name).ok_or_else(|| {
            Error::Config(format!("no session origin in source name {source_name:?}"))
        })?;

        Ok(Self::with_origin(origin))
    }

    pub fn with_origin(origin: Timestamp) -> Self {
        let tags = [
            (ACCEL_RATE_MAG_TAG, &ACCEL_RATE_MAG),
            (EULER_RATE_TAG, &EULER_RATE),
        ]
        .map(|(tag, shape)| TagSpec {
            tag,
            width: width(shape),
            checksum: CHECKSUM,
        });

        Self {
            origin,
            sieve: TaggedSieve::new(tags.to_vec()),
        }
    }
}

impl Format for Imu {
    fn sieve(&self, _: &ParserState) -> SievePolicy {
        SievePolicy::Tagged(self.sieve.clone())
    }

    fn decode(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        _: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError> {
        let r = chunk.bytes;

        let shape = match r.first() {
            Some(&ACCEL_RATE_MAG_TAG) => &ACCEL_RATE_MAG,
            Some(&EULER_RATE_TAG) => &EULER_RATE,
            Some(tag) => Err(DecodeError::UnknownKind(format!("tag {tag:#04x}")))?,
            None => Err(DecodeError::Truncated {
                needed: 1,
                available: 0,
            })?,
        };

        CHECKSUM.verify(r)?;

        let timer = read::<u32>(r, r.len().saturating_sub(6), Endian::Big)?;
        let anchor = state.time_anchor.unwrap_or(timer);

        let clock = CounterClock {
            origin: self.origin,
            tick_rate: TICK_RATE,
        };

        let particle = Particle::new(shape.kind(), shape.decode(&r[1..])?, clock.at(anchor, timer));

        Ok(Decoded {
            particles: vec![particle],
            state: ParserState {
                time_anchor: Some(anchor),
                ..state.clone()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::check::sum16, particle::Value};

    fn record(timer: u32) -> Vec<u8> {
        let mut r = vec![ACCEL_RATE_MAG_TAG];
        for i in 0..9 {
            r.extend_from_slice(&(i as f32 * 0.5).to_be_bytes());
        }
        r.extend_from_slice(&timer.to_be_bytes());
        let sum = sum16(&r);
        r.extend_from_slice(&sum.to_be_bytes());
        r
    }

    fn chunk(r: &[u8]) -> Chunk<'_> {
        Chunk {
            start: 0,
            end: r.len() as u64,
            bytes: r,
            pattern: None,
        }
    }

    #[test]
    fn record_widths() {
        assert_eq!(width(&ACCEL_RATE_MAG), 43);
        assert_eq!(width(&EULER_RATE), 31);
        assert_eq!(record(0).len(), 43);
    }

    #[test]
    fn first_timer_reading_anchors_the_clock() {
        let imu = Imu::with_origin(Timestamp::from_unix_seconds(1000.0));
        let mut empty: &[u8] = &[];

        let r = record(125_000);
        let first = imu.decode(&chunk(&r), &ParserState::new(), &mut empty).unwrap();
        assert_eq!(first.state.time_anchor, Some(125_000));
        assert_eq!(
            first.particles[0].timestamp(),
            Timestamp::from_unix_seconds(1000.0)
        );

        let r = record(187_500);
        let second = imu.decode(&chunk(&r), &first.state, &mut empty).unwrap();
        assert_eq!(
            second.particles[0].timestamp(),
            Timestamp::from_unix_seconds(1001.0)
        );

        let p = &second.particles[0];
        assert_eq!(p.kind(), "imu_accel_rate_mag");
        assert_eq!(p.get("accel_y"), Some(&Value::Float(0.5)));
        assert_eq!(p.get("timer"), Some(&Value::UInt(187_500)));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let imu = Imu::with_origin(Timestamp::from_unix_seconds(0.0));
        let mut r = record(1);
        r[42] ^= 0xFF;

        let mut empty: &[u8] = &[];
        let result = imu.decode(&chunk(&r), &ParserState::new(), &mut empty);
        assert!(matches!(result, Err(DecodeError::Checksum { .. })));
    }
}
