//! Velocity records laid out by a one-time control record.
//!
//! A stream opens with a control record of one boolean byte per entry of a
//! fixed field table. The enabled fields, in table order, make up every data
//! record that follows. An all-zero record ends the data, and an 8-byte time
//! record declaring the sampling window closes the stream.
//!
//! ```text
//! control (26) | data (W) ... | sentinel (W, zeros) | time_on time_off (8)
//! ```
//!
//! Data records are timed by interpolating across the window, so decoding the
//! control record reads ahead to the end of the stream for the window and
//! record count. The stream must therefore be complete.

use crate::{
    Error,
    chunker::{Chunk, PatternSieve, SievePolicy},
    codec::{DecodeError, Endian, FieldSpec, FieldType::*, RecordShape, read},
    driver::{LayoutPhase, ParserState, TimeWindow},
    particle::{Particle, Timestamp, Value, time::Interpolation},
};

use super::{Decoded, Format, Probe};

const KIND: &str = "velocity_sample";
const TIME_LEN: usize = 8;

/// Every field a control record may enable, in record order.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("sound_speed", U16),
    FieldSpec::new("heading", I16),
    FieldSpec::new("pitch", I16),
    FieldSpec::new("roll", I16),
    FieldSpec::new("temperature", I16),
    FieldSpec::new("pressure", U32),
    FieldSpec::new("battery_voltage", U16),
    FieldSpec::new("status", U8),
    FieldSpec::new("error_code", U16),
    FieldSpec::new("velocity_beam1", I16),
    FieldSpec::new("velocity_beam2", I16),
    FieldSpec::new("velocity_beam3", I16),
    FieldSpec::new("velocity_beam4", I16),
    FieldSpec::new("amplitude_beam1", U8),
    FieldSpec::new("amplitude_beam2", U8),
    FieldSpec::new("amplitude_beam3", U8),
    FieldSpec::new("amplitude_beam4", U8),
    FieldSpec::new("correlation_beam1", U8),
    FieldSpec::new("correlation_beam2", U8),
    FieldSpec::new("correlation_beam3", U8),
    FieldSpec::new("correlation_beam4", U8),
    FieldSpec::new("analog_input1", U16),
    FieldSpec::new("analog_input2", U16),
    FieldSpec::new("magnetometer_x", I16),
    FieldSpec::new("magnetometer_y", I16),
    FieldSpec::new("magnetometer_z", I16),
];

#[derive(Debug, Clone, Default)]
pub struct Velocity;

impl Velocity {
    pub fn new() -> Self {
        Self
    }
}

fn shape(flags: &[bool]) -> Result<RecordShape, DecodeError> {
    let shape = RecordShape::select(KIND, Endian::Big, FIELDS, flags)?;

    if shape.width() == 0 {
        Err(DecodeError::Malformed("control record enables no fields".into()))?;
    }

    Ok(shape)
}

/// The layout state a phase needs.
fn layout(state: &ParserState) -> Result<(RecordShape, TimeWindow), DecodeError> {
    match (&state.field_flags, state.time_window) {
        (Some(flags), Some(window)) => Ok((shape(flags)?, window)),
        _ => Err(DecodeError::Malformed(format!(
            "{:?} phase without a control record",
            state.phase
        ))),
    }
}

fn seconds(t: u32) -> Timestamp {
    Timestamp::from_unix_seconds(t.into())
}

impl Velocity {
    fn decode_control(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        probe: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError> {
        let r = chunk.bytes;

        if let Some(b) = r.iter().find(|b| **b > 1) {
            Err(DecodeError::Malformed(format!("control byte {b:#04x} is not a flag")))?;
        }

        let flags = r.iter().map(|b| *b == 1).collect::<Vec<_>>();
        let width = shape(&flags)?.width() as u64;

        // The sentinel and time record end the stream.
        let len = probe.len()?;
        let sentinel = len
            .checked_sub(TIME_LEN as u64 + width)
            .filter(|sentinel| *sentinel >= chunk.end)
            .ok_or_else(|| {
                DecodeError::Malformed(format!("stream of {len} bytes ends before its time record"))
            })?;

        let data = sentinel - chunk.end;
        if data % width != 0 {
            Err(DecodeError::Malformed(format!(
                "{data} data bytes are not a whole number of {width} byte records"
            )))?;
        }

        let mut tail = vec![0; width as usize + TIME_LEN];
        probe.read_at(sentinel, &mut tail)?;

        let (zeros, time) = tail.split_at(width as usize);
        if zeros.iter().any(|b| *b != 0) {
            Err(DecodeError::Malformed("missing sentinel record".into()))?;
        }

        let window = TimeWindow {
            time_on: seconds(read::<u32>(time, 0, Endian::Big)?),
            time_off: seconds(read::<u32>(time, 4, Endian::Big)?),
            count: (data / width) as u32,
        };

        Ok(Decoded {
            particles: Vec::new(),
            state: ParserState {
                phase: LayoutPhase::Data,
                field_flags: Some(flags),
                time_window: Some(window),
                records_read: 0,
                ..state.clone()
            },
        })
    }

    fn decode_data(&self, r: &[u8], state: &ParserState) -> Result<Decoded, DecodeError> {
        let (shape, window) = layout(state)?;

        if r.iter().all(|b| *b == 0) {
            return Ok(Decoded {
                particles: Vec::new(),
                state: ParserState {
                    phase: LayoutPhase::Trailer,
                    ..state.clone()
                },
            });
        }

        let interpolation = Interpolation {
            start: window.time_on,
            end: window.time_off,
            count: window.count,
        };

        let particle = Particle::new(
            shape.kind(),
            shape.decode(r)?,
            interpolation.at(state.records_read),
        );

        Ok(Decoded {
            particles: vec![particle],
            state: ParserState {
                records_read: state.records_read + 1,
                ..state.clone()
            },
        })
    }

    fn decode_trailer(&self, r: &[u8], state: &ParserState) -> Result<Decoded, DecodeError> {
        let time_on = read::<u32>(r, 0, Endian::Big)?;
        let time_off = read::<u32>(r, 4, Endian::Big)?;

        let particle = Particle::new(
            "velocity_profile_time",
            vec![
                ("time_on", Value::UInt(time_on.into())),
                ("time_off", Value::UInt(time_off.into())),
                ("number_of_records", Value::UInt(state.records_read.into())),
            ],
            seconds(time_on),
        );

        Ok(Decoded {
            particles: vec![particle],
            state: ParserState {
                phase: LayoutPhase::Done,
                ..state.clone()
            },
        })
    }
}

impl Format for Velocity {
    fn sieve(&self, state: &ParserState) -> SievePolicy {
        match state.phase {
            LayoutPhase::Control => SievePolicy::Fixed {
                width: FIELDS.len(),
            },
            LayoutPhase::Data => SievePolicy::Fixed {
                width: layout(state).map_or(0, |(shape, _)| shape.width()),
            },
            LayoutPhase::Trailer => SievePolicy::Fixed { width: TIME_LEN },
            // Nothing further is a record.
            LayoutPhase::Done => SievePolicy::Pattern(PatternSieve::default()),
        }
    }

    fn decode(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        probe: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError> {
        match state.phase {
            LayoutPhase::Control => self.decode_control(chunk, state, probe),
            LayoutPhase::Data => self.decode_data(chunk.bytes, state),
            LayoutPhase::Trailer => self.decode_trailer(chunk.bytes, state),
            LayoutPhase::Done => Err(DecodeError::Malformed("record after time record".into())),
        }
    }

    fn check_state(&self, state: &ParserState) -> Result<(), Error> {
        if let Some(flags) = &state.field_flags {
            if flags.len() != FIELDS.len() {
                Err(Error::InvalidState(format!(
                    "expected {} field flags, found {}",
                    FIELDS.len(),
                    flags.len()
                )))?;
            }
        }

        if matches!(state.phase, LayoutPhase::Data | LayoutPhase::Trailer) {
            layout(state).map_err(|err| Error::InvalidState(err.to_string()))?;
        }

        Ok(())
    }

    fn recover(&self, state: &ParserState, _: &DecodeError) -> ParserState {
        match state.phase {
            // Without a layout, nothing further can be decoded.
            LayoutPhase::Control => ParserState {
                phase: LayoutPhase::Done,
                ..state.clone()
            },
            _ => state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(enabled: &[usize]) -> Vec<u8> {
        (0..FIELDS.len())
            .map(|i| u8::from(enabled.contains(&i)))
            .collect()
    }

    fn chunk(r: &[u8], start: u64) -> Chunk<'_> {
        Chunk {
            start,
            end: start + r.len() as u64,
            bytes: r,
            pattern: None,
        }
    }

    /// Sound speed and pressure: 6 byte records.
    fn stream(records: usize) -> Vec<u8> {
        let mut r = flags(&[0, 5]);
        for i in 0..records {
            r.extend_from_slice(&1500u16.to_be_bytes());
            r.extend_from_slice(&(i as u32 + 1).to_be_bytes());
        }
        r.extend_from_slice(&[0; 6]);
        r.extend_from_slice(&1000u32.to_be_bytes());
        r.extend_from_slice(&1030u32.to_be_bytes());
        r
    }

    #[test]
    fn control_record_reads_layout_from_the_tail() {
        let r = stream(3);
        let mut probe = r.as_slice();

        let decoded = Velocity
            .decode(&chunk(&r[..26], 0), &ParserState::new(), &mut probe)
            .unwrap();
        assert!(decoded.particles.is_empty());

        let state = decoded.state;
        assert_eq!(state.phase, LayoutPhase::Data);
        assert_eq!(
            state.time_window,
            Some(TimeWindow {
                time_on: seconds(1000),
                time_off: seconds(1030),
                count: 3
            })
        );
        assert!(Velocity.sieve(&state).scan(&[0; 6], false).is_some());
        assert_eq!(Velocity.sieve(&state).scan(&[0; 5], false), None);

        let second = Velocity.decode(&chunk(&r[32..38], 32), &state, &mut probe).unwrap();
        let p = &second.particles[0];
        assert_eq!(
            p.values(),
            [("sound_speed", Value::UInt(1500)), ("pressure", Value::UInt(2))]
        );
        assert_eq!(p.timestamp(), seconds(1000));
    }

    #[test]
    fn non_boolean_control_byte_is_malformed() {
        let mut r = stream(1);
        r[3] = 2;
        let mut probe = r.as_slice();

        let result = Velocity.decode(&chunk(&r[..26], 0), &ParserState::new(), &mut probe);
        let Err(error) = result else {
            panic!("decoded a malformed control record");
        };
        assert!(matches!(error, DecodeError::Malformed(_)));
        assert_eq!(
            Velocity.recover(&ParserState::new(), &error).phase,
            LayoutPhase::Done
        );
    }

    #[test]
    fn inconsistent_tail_is_malformed() {
        let mut r = stream(2);
        r.push(0);
        let mut probe = r.as_slice();

        let result = Velocity.decode(&chunk(&r[..26], 0), &ParserState::new(), &mut probe);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn data_phase_needs_a_layout() {
        let state = ParserState {
            phase: LayoutPhase::Data,
            ..ParserState::new()
        };
        assert!(matches!(
            Velocity.check_state(&state),
            Err(Error::InvalidState(_))
        ));

        let state = ParserState {
            field_flags: Some(vec![true; 3]),
            ..ParserState::new()
        };
        assert!(Velocity.check_state(&state).is_err());
    }
}
