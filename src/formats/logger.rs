//! Nutrient sensor frames captured by a data logger.
//!
//! The logger prefixes every line with its own text timestamp. Sensor frames
//! follow it with a frame id, an ASCII serial number and a binary body closed
//! by a checksum byte; the logger's own status lines are interleaved and
//! skipped.

use crate::{
    Error,
    chunker::{Chunk, PatternSieve, SievePolicy},
    codec::{ChecksumRule, DecodeError, Endian, FieldSpec, FieldType::*, RecordShape, Region},
    driver::ParserState,
    particle::{Particle, Value, time::parse_logger_time},
};

use super::{Decoded, Format, Probe};

const TIMESTAMP: &str = r"\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}\.\d{3}";

/// Frame ids, in pattern order.
const FRAMES: [&str; 2] = ["SATNLF", "SATNDF"];

const TIME_LEN: usize = 23;
const FRAME_START: usize = TIME_LEN + 1;
const SERIAL_START: usize = FRAME_START + 6;
const BODY_START: usize = SERIAL_START + 4;

/// From the frame id through the checksum byte, excluding the line ending.
const CHECKSUM: ChecksumRule = ChecksumRule::ZeroSum8 {
    region: Region {
        start: FRAME_START,
        trailing: 2,
    },
};

const BODY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("year_day", I32),
    FieldSpec::new("decimal_hours", F64),
    FieldSpec::new("nitrate_concentration", F32),
    FieldSpec::new("nitrogen_in_nitrate", F32),
    FieldSpec::new("absorbance_254", F32),
    FieldSpec::new("absorbance_350", F32),
    FieldSpec::new("bromide_trace", F32),
    FieldSpec::new("spectrum_average", U16),
    FieldSpec::new("dark_value", U16),
    FieldSpec::new("integration_factor", U8),
    FieldSpec::new("temperature_internal", F32),
    FieldSpec::new("humidity", F32),
    FieldSpec::new("voltage_main", F32),
    FieldSpec::new("current_main", F32),
];

/// Shapes of each frame, in pattern order.
static SHAPES: [RecordShape; 2] = [
    RecordShape::new("nutrient_light", Endian::Big, BODY_FIELDS),
    RecordShape::new("nutrient_dark", Endian::Big, BODY_FIELDS),
];

#[derive(Debug, Clone)]
pub struct Logger {
    sieve: PatternSieve,
}

impl Logger {
    pub fn new() -> Result<Self, Error> {
        // Body and checksum byte.
        let trailing = SHAPES[0].width() + 1;

        let records =
            FRAMES.map(|frame| format!(r"(?s-u){TIMESTAMP} {frame}\d{{4}}.{{{trailing}}}\r\n"));
        let records = records.iter().map(String::as_str).collect::<Vec<_>>();

        let status = format!(r"(?-u){TIMESTAMP} \[[^\]\r\n]*\]:[^\r\n]*\r\n");

        let sieve = PatternSieve::new(&records, &[status.as_str()])
            .map_err(|err| Error::Config(format!("invalid logger pattern: {err}")))?;

        Ok(Self { sieve })
    }
}

impl Format for Logger {
    fn sieve(&self, _: &ParserState) -> SievePolicy {
        SievePolicy::Pattern(self.sieve.clone())
    }

    fn decode(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        _: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError> {
        let r = chunk.bytes;

        let shape = chunk
            .pattern
            .and_then(|i| SHAPES.get(i))
            .ok_or_else(|| DecodeError::UnknownKind(format!("pattern {:?}", chunk.pattern)))?;

        CHECKSUM.verify(r)?;

        let text = |range: std::ops::Range<usize>| {
            r.get(range)
                .and_then(|t| std::str::from_utf8(t).ok())
                .ok_or_else(|| DecodeError::Malformed("frame text is not ASCII".into()))
        };

        let timestamp = parse_logger_time(text(0..TIME_LEN)?)?;

        let serial_number = text(SERIAL_START..BODY_START)?
            .parse::<u64>()
            .map_err(|err| DecodeError::Malformed(format!("serial number: {err}")))?;

        let mut values = vec![("serial_number", Value::UInt(serial_number))];
        values.extend(shape.decode(&r[BODY_START..])?);

        Ok(Decoded {
            particles: vec![Particle::new(shape.kind(), values, timestamp)],
            state: state.clone(),
        })
    }
}
