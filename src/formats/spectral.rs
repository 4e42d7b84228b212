//! Absorption and attenuation spectra packets.
//!
//! Packets open with a registration prefix and declare their own length,
//! which varies with the number of wavelengths sampled. A 16-bit byte sum of
//! the declared bytes and a pad byte close each packet.

use zerocopy::{
    FromBytes,
    byteorder::big_endian::{U16, U32},
};

use crate::{
    Error,
    chunker::{Chunk, LengthEncoding, LengthField, PrefixSieve, SievePolicy},
    codec::{ChecksumRule, DecodeError, Endian, Region, read, read_u24},
    driver::ParserState,
    particle::{
        Particle, Timestamp, Value,
        time::{CounterClock, origin_from_source_name},
    },
};

use super::{Decoded, Format, Probe};

const REGISTRATION: &[u8] = &[0xFF, 0x00, 0xFF, 0x00];
const HEADER_LEN: usize = 32;
/// Checksum and pad byte.
const OVERHEAD: usize = 3;
/// Bytes of counts per wavelength.
const WAVELENGTH_LEN: usize = 8;

const CHECKSUM: ChecksumRule = ChecksumRule::MaskedSum16 {
    region: Region::trailing(OVERHEAD),
    endian: Endian::Big,
};

#[repr(C, packed)]
#[derive(FromBytes)]
struct Header {
    registration: [u8; 4],
    record_length: U16,
    packet_type: u8,
    _reserved0: u8,
    meter_type: u8,
    serial_number: [u8; 3],
    a_reference_dark: U16,
    pressure_counts: U16,
    a_signal_dark: U16,
    external_temp_raw: U16,
    internal_temp_raw: U16,
    c_reference_dark: U16,
    c_signal_dark: U16,
    elapsed_ms: U32,
    _reserved1: u8,
    num_wavelengths: u8,
}

#[derive(Debug, Clone)]
pub struct Spectral {
    origin: Timestamp,
    sieve: PrefixSieve,
}

impl Spectral {
    /// Build the format for a stream whose session origin is encoded in its
    /// source name.
    pub fn new(source_name: &str) -> Result<Self, Error> {
        let origin = origin_from_source_name(source_name).ok_or_else(|| {
            Error::Config(format!("no session origin in source name {source_name:?}"))
        })?;

        Ok(Self::with_origin(origin))
    }

    pub fn with_origin(origin: Timestamp) -> Self {
        let length = LengthField {
            offset: 4,
            width: 2,
            encoding: LengthEncoding::Binary(Endian::Big),
        };

        Self {
            origin,
            sieve: PrefixSieve::new(REGISTRATION, length, OVERHEAD)
                .with_minimum(HEADER_LEN)
                .with_header_check(HEADER_LEN, consistent),
        }
    }
}

/// Whether a header's declared length fits its wavelength count.
fn consistent(header: &[u8]) -> bool {
    match (header.get(4..6), header.get(HEADER_LEN - 1)) {
        (Some(&[hi, lo]), Some(&wavelengths)) => {
            usize::from(u16::from_be_bytes([hi, lo]))
                == HEADER_LEN + WAVELENGTH_LEN * usize::from(wavelengths)
        }
        _ => false,
    }
}

impl Format for Spectral {
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
                needed: HEADER_LEN + OVERHEAD,
                available: r.len(),
            })?;

        let Header {
            registration,
            record_length,
            packet_type,
            meter_type,
            serial_number,
            a_reference_dark,
            pressure_counts,
            a_signal_dark,
            external_temp_raw,
            internal_temp_raw,
            c_reference_dark,
            c_signal_dark,
            elapsed_ms,
            num_wavelengths,
            ..
        } = zerocopy::transmute!(header);

        if registration != REGISTRATION {
            Err(DecodeError::Malformed("incorrect registration bytes".into()))?;
        }

        let record_length = usize::from(record_length.get());
        let wavelengths = usize::from(num_wavelengths);

        if record_length != HEADER_LEN + WAVELENGTH_LEN * wavelengths {
            Err(DecodeError::Malformed(format!(
                "record length {record_length} does not fit {wavelengths} wavelengths"
            )))?;
        }

        if r.len() != record_length + OVERHEAD {
            Err(DecodeError::Truncated {
                needed: record_length + OVERHEAD,
                available: r.len(),
            })?;
        }

        CHECKSUM.verify(r)?;

        // Counts are interleaved per wavelength.
        let mut counts: [Vec<Value>; 4] = Default::default();
        for (i, list) in counts.iter_mut().enumerate() {
            *list = (0..wavelengths)
                .map(|w| {
                    let offset = HEADER_LEN + w * WAVELENGTH_LEN + i * 2;
                    read::<u16>(r, offset, Endian::Big).map(|c| Value::UInt(c.into()))
                })
                .collect::<Result<_, _>>()?;
        }
        let [c_reference, a_reference, c_signal, a_signal] = counts;

        let clock = CounterClock {
            origin: self.origin,
            tick_rate: 1000.0,
        };
        let timestamp = clock.at(0, elapsed_ms.get());

        let serial_number = read_u24(&serial_number, 0, Endian::Big)?;

        let mut particles = Vec::with_capacity(2);

        if !state.metadata_sent {
            particles.push(Particle::new(
                "spectral_metadata",
                vec![
                    ("serial_number", Value::UInt(serial_number.into())),
                    ("meter_type", Value::UInt(meter_type.into())),
                    ("packet_type", Value::UInt(packet_type.into())),
                    ("num_wavelengths", Value::UInt(num_wavelengths.into())),
                ],
                timestamp,
            ));
        }

        let u16_value = |v: U16| Value::UInt(v.get().into());

        particles.push(Particle::new(
            "spectral_sample",
            vec![
                ("a_reference_dark", u16_value(a_reference_dark)),
                ("pressure_counts", u16_value(pressure_counts)),
                ("a_signal_dark", u16_value(a_signal_dark)),
                ("external_temp_raw", u16_value(external_temp_raw)),
                ("internal_temp_raw", u16_value(internal_temp_raw)),
                ("c_reference_dark", u16_value(c_reference_dark)),
                ("c_signal_dark", u16_value(c_signal_dark)),
                ("elapsed_ms", Value::UInt(elapsed_ms.get().into())),
                ("num_wavelengths", Value::UInt(num_wavelengths.into())),
                ("c_reference", Value::List(c_reference)),
                ("a_reference", Value::List(a_reference)),
                ("c_signal", Value::List(c_signal)),
                ("a_signal", Value::List(a_signal)),
            ],
            timestamp,
        ));

        Ok(Decoded {
            particles,
            state: ParserState {
                metadata_sent: true,
                ..state.clone()
            },
        })
    }
}
