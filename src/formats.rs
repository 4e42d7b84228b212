//! Record families.
//!
//! A [`Format`] supplies everything instrument-specific about a stream: the
//! sieve policy finding its records, and the decoding of each record into
//! particles. Formats hold only immutable configuration built at
//! construction; anything carried between records lives in the
//! [`ParserState`] threaded through [`Format::decode`].

pub mod imu;
pub mod logger;
pub mod profile;
pub mod spectral;
pub mod velocity;

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    chunker::{Chunk, SievePolicy},
    codec::DecodeError,
    driver::ParserState,
    particle::Particle,
};

pub use imu::Imu;
pub use logger::Logger;
pub use profile::Profile;
pub use spectral::Spectral;
pub use velocity::Velocity;

/// The result of decoding one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Particles in emission order. May be empty.
    pub particles: Vec<Particle>,
    /// The state after the chunk. The driver sets its position.
    pub state: ParserState,
}

/// Random access to the stream being parsed, for formats whose records
/// depend on bytes not yet sieved.
///
/// Probing never disturbs the driver's read position.
pub trait Probe {
    /// Total length of the stream.
    fn len(&mut self) -> Result<u64, DecodeError>;
    /// Fill `buf` with the bytes at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError>;
}

/// An instrument record family.
#[allow(unused_variables)]
pub trait Format {
    /// The sieve policy finding the next record, given the current state.
    fn sieve(&self, state: &ParserState) -> SievePolicy;

    /// Decode and verify one chunk.
    ///
    /// Decoding must be a deterministic function of the chunk, the state and
    /// the stream, so a chunk decoded again on resume yields the same
    /// particles.
    fn decode(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        probe: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError>;

    /// Reject a state this format cannot resume from.
    fn check_state(&self, state: &ParserState) -> Result<(), Error> {
        Ok(())
    }

    /// The state after a chunk failed to decode. The driver sets its
    /// position.
    fn recover(&self, state: &ParserState, error: &DecodeError) -> ParserState {
        state.clone()
    }
}

/// Any of the supported record families.
#[derive(Debug, Clone)]
pub enum AnyFormat {
    Imu(Imu),
    Profile(Profile),
    Spectral(Spectral),
    Logger(Logger),
    Velocity(Velocity),
}

macro_rules! delegate {
    ($self:ident, $f:ident => $e:expr) => {
        match $self {
            AnyFormat::Imu($f) => $e,
            AnyFormat::Profile($f) => $e,
            AnyFormat::Spectral($f) => $e,
            AnyFormat::Logger($f) => $e,
            AnyFormat::Velocity($f) => $e,
        }
    };
}

impl Format for AnyFormat {
    fn sieve(&self, state: &ParserState) -> SievePolicy {
        delegate!(self, f => f.sieve(state))
    }

    fn decode(
        &self,
        chunk: &Chunk<'_>,
        state: &ParserState,
        probe: &mut dyn Probe,
    ) -> Result<Decoded, DecodeError> {
        delegate!(self, f => f.decode(chunk, state, probe))
    }

    fn check_state(&self, state: &ParserState) -> Result<(), Error> {
        delegate!(self, f => f.check_state(state))
    }

    fn recover(&self, state: &ParserState, error: &DecodeError) -> ParserState {
        delegate!(self, f => f.recover(state, error))
    }
}

/// Configuration selecting a record family.
///
/// ```json
/// { "family": "imu", "source_name": "imu_20111011_233842.3dmgx3" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FormatConfig {
    /// Tag-framed inertial records with counter time.
    Imu { source_name: String },
    /// Envelopes of conductivity, temperature, pressure and oxygen samples.
    Profile,
    /// Absorption and attenuation spectra with counter time.
    Spectral { source_name: String },
    /// Nutrient lines from a data logger.
    Logger,
    /// Velocity records laid out by a control record.
    Velocity,
}

impl FormatConfig {
    /// Build the family's format. Fails if the configuration is unusable.
    pub fn build(&self) -> Result<AnyFormat, Error> {
        Ok(match self {
            Self::Imu { source_name } => AnyFormat::Imu(Imu::new(source_name)?),
            Self::Profile => AnyFormat::Profile(Profile::new()),
            Self::Spectral { source_name } => AnyFormat::Spectral(Spectral::new(source_name)?),
            Self::Logger => AnyFormat::Logger(Logger::new()?),
            Self::Velocity => AnyFormat::Velocity(Velocity::new()),
        })
    }
}

/// A probe over a stream fully held in memory.
impl Probe for &[u8] {
    fn len(&mut self) -> Result<u64, DecodeError> {
        Ok(<[u8]>::len(self) as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError> {
        let start = usize::try_from(offset).map_err(|err| DecodeError::Probe(err.to_string()))?;
        let r = self.get(start..start + buf.len()).ok_or(DecodeError::Probe(format!(
            "{} bytes at {offset} are past the end",
            buf.len()
        )))?;

        buf.copy_from_slice(r);
        Ok(())
    }
}
