//! The resumable decode loop.
//!
//! A [`Driver`] owns one byte stream for one parse session. It reads the
//! stream into a [`Chunker`], decodes each chunk with its [`Format`], and
//! threads a [`ParserState`] through every step, notifying [`Callbacks`] as
//! it goes.
//!
//! Every byte consumed advances the persisted position exactly once, so a
//! driver constructed from any persisted state reproduces the remaining
//! output of an uninterrupted parse.

pub mod callbacks;
pub mod state;

use std::{
    collections::VecDeque,
    io::{ErrorKind, Read, Seek, SeekFrom},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Condition, Error,
    chunker::{Chunk, Chunker, NonDataSpan},
    codec::DecodeError,
    formats::{Format, Probe},
    particle::Particle,
};

pub use callbacks::{Callbacks, Collect};
pub use state::{LayoutPhase, ParserState, TimeWindow};

/// Driver tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Bytes requested from the stream per read.
    pub read_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { read_size: 4096 }
    }
}

/// Whether more chunks may yet be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Accumulating,
    /// The stream reached its end and no further chunk is buffered.
    Exhausted,
}

/// A parse session over one stream.
pub struct Driver<S, F, C> {
    stream: S,
    format: F,
    callbacks: C,
    config: DriverConfig,
    chunker: Chunker,
    state: ParserState,
    /// Decoded particles not yet returned, each with the state following it.
    pending: VecDeque<(Particle, ParserState)>,
    phase: Phase,
}

impl<S: Read + Seek, F: Format, C: Callbacks> Driver<S, F, C> {
    /// Start a session, resuming from `state` if given.
    ///
    /// Fails if the state is inconsistent with the format, or the stream
    /// cannot be positioned.
    pub fn new(format: F, state: Option<ParserState>, stream: S, callbacks: C) -> Result<Self, Error> {
        Self::with_config(format, state, stream, callbacks, DriverConfig::default())
    }

    pub fn with_config(
        format: F,
        state: Option<ParserState>,
        mut stream: S,
        callbacks: C,
        config: DriverConfig,
    ) -> Result<Self, Error> {
        if config.read_size == 0 {
            Err(Error::Config("read size must be positive".into()))?;
        }

        let state = state.unwrap_or_default();
        format.check_state(&state)?;
        stream.seek(SeekFrom::Start(state.position))?;

        info!(position = state.position, "starting parse session");

        let chunker = Chunker::new(format.sieve(&state), state.position);

        Ok(Self {
            stream,
            format,
            callbacks,
            config,
            chunker,
            state,
            pending: VecDeque::new(),
            phase: Phase::Accumulating,
        })
    }

    /// Return up to `max` particles in stream order.
    ///
    /// Returns fewer, possibly none, once no complete record is buffered and
    /// the stream has no more bytes. Calling again after the stream grows
    /// continues where this call stopped.
    pub fn get_records(&mut self, max: usize) -> Result<Vec<Particle>, Error> {
        let mut particles = Vec::new();

        while particles.len() < max {
            if let Some((particle, state)) = self.pending.pop_front() {
                particles.push(particle);
                self.commit(state);
                continue;
            }

            if !self.advance()? {
                break;
            }
        }

        if !particles.is_empty() {
            self.callbacks.on_publish(&particles);
        }

        Ok(particles)
    }

    /// Resume from another state, discarding everything buffered.
    pub fn set_state(&mut self, state: ParserState) -> Result<(), Error> {
        self.format.check_state(&state)?;
        self.stream.seek(SeekFrom::Start(state.position))?;

        info!(position = state.position, "resuming from state");

        self.chunker.reset(state.position);
        self.chunker.set_policy(self.format.sieve(&state));
        self.pending.clear();
        self.phase = Phase::Accumulating;
        self.state = state;

        Ok(())
    }

    /// Treat the stream as complete: return every particle still buffered,
    /// then report any bytes left over as unexpected non-data and move past
    /// them.
    ///
    /// Records whose span was cut short by the end of the stream are given up
    /// on, so records buffered after them are still found. Only acts once the
    /// stream is exhausted.
    pub fn flush(&mut self) -> Result<Vec<Particle>, Error> {
        if self.phase != Phase::Exhausted {
            return Ok(Vec::new());
        }

        let mut particles = Vec::new();

        loop {
            while let Some((particle, state)) = self.pending.pop_front() {
                particles.push(particle);
                self.commit(state);
            }

            if !self.consume(true) {
                break;
            }
        }

        let Self {
            chunker,
            callbacks,
            state,
            phase,
            ..
        } = self;

        if let Some(span) = chunker.flush() {
            *state = non_data(span, state, callbacks);
        }
        chunker.drop_consumed();
        *phase = Phase::Exhausted;

        if !particles.is_empty() {
            callbacks.on_publish(&particles);
        }

        Ok(particles)
    }

    /// The state after the last particle returned.
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn position(&self) -> u64 {
        self.state.position
    }

    /// Whether the stream ran out of bytes without yielding another record.
    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Exhausted
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// End the session, returning the stream and callbacks.
    pub fn into_parts(self) -> (S, C) {
        (self.stream, self.callbacks)
    }

    fn commit(&mut self, state: ParserState) {
        self.state = state;
        self.callbacks.on_state(&self.state);
    }

    /// Consume one piece of the stream, reading more bytes if none is
    /// buffered. Returns `false` if the stream is exhausted.
    fn advance(&mut self) -> Result<bool, Error> {
        loop {
            if self.consume(false) {
                return Ok(true);
            }

            if !self.fill()? {
                self.phase = Phase::Exhausted;
                return Ok(false);
            }
        }
    }

    /// Consume one buffered piece. Returns `false` if none is buffered.
    fn consume(&mut self, at_end: bool) -> bool {
        let Self {
            stream,
            format,
            callbacks,
            chunker,
            state,
            pending,
            phase,
            ..
        } = self;

        let tip = chunker.tip();

        let Some((span, chunk)) = chunker.next(at_end) else {
            return false;
        };

        *phase = Phase::Accumulating;

        if let Some(span) = span {
            *state = non_data(span, state, callbacks);
        }

        if let Some(chunk) = chunk {
            let mut probe = StreamProbe {
                stream,
                restore: tip,
            };

            let (next, queued) = decode(&chunk, &*format, state, &mut probe, callbacks);
            chunker.set_policy(format.sieve(&next));

            // With particles queued, the state advances as each is
            // delivered.
            if queued.is_empty() {
                *state = next;
                callbacks.on_state(state);
            } else {
                pending.extend(queued);
            }
        }

        chunker.drop_consumed();
        true
    }

    /// Read more of the stream. Returns `false` at its end.
    fn fill(&mut self) -> Result<bool, Error> {
        let mut buf = vec![0; self.config.read_size];

        let n = loop {
            match self.stream.read(&mut buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => Err(err)?,
            }
        };

        self.chunker.feed(&buf[..n]);
        Ok(n > 0)
    }
}

/// Report a non-data span and return the state after it.
fn non_data(span: NonDataSpan<'_>, state: &ParserState, callbacks: &mut impl Callbacks) -> ParserState {
    if span.benign {
        debug!(start = span.start, len = span.len(), "skipped benign non-data");
    } else {
        warn!(start = span.start, len = span.len(), "skipped unexpected non-data");
        callbacks.on_error(&Condition::Unexpected {
            start: span.start,
            bytes: span.bytes.to_vec(),
        });
    }

    let next = state.moved_to(span.end);
    callbacks.on_state(&next);
    next
}

/// Decode a chunk into particles, each paired with the state to persist once
/// it is delivered.
///
/// Returns the state after the whole chunk, and the particles. If the chunk
/// yields no particles, that state takes effect immediately.
fn decode(
    chunk: &Chunk<'_>,
    format: &impl Format,
    state: &ParserState,
    probe: &mut dyn Probe,
    callbacks: &mut impl Callbacks,
) -> (ParserState, Vec<(Particle, ParserState)>) {
    // Particles already delivered from this chunk before a resume.
    let skip = if chunk.start == state.position {
        state.chunk_progress as usize
    } else {
        0
    };

    let decoded = match format.decode(chunk, state, probe) {
        Ok(decoded) => decoded,
        Err(error) => {
            warn!(start = chunk.start, end = chunk.end, %error, "sample error");
            let next = format.recover(state, &error).moved_to(chunk.end);
            callbacks.on_error(&Condition::Sample {
                start: chunk.start,
                end: chunk.end,
                error,
            });
            return (next, Vec::new());
        }
    };

    debug!(
        start = chunk.start,
        end = chunk.end,
        particles = decoded.particles.len(),
        "decoded chunk"
    );

    let last = decoded.particles.len();
    let after = decoded.state.moved_to(chunk.end);

    let queued = decoded
        .particles
        .into_iter()
        .enumerate()
        .skip(skip)
        .map(|(i, particle)| {
            let state = if i + 1 == last {
                after.clone()
            } else {
                ParserState {
                    chunk_progress: (i + 1) as u32,
                    ..state.moved_to(chunk.start)
                }
            };
            (particle, state)
        })
        .collect::<Vec<_>>();

    (after, queued)
}

/// Reads ahead in the stream, restoring its position afterward.
struct StreamProbe<'a, S> {
    stream: &'a mut S,
    restore: u64,
}

impl<S: Read + Seek> StreamProbe<'_, S> {
    fn settle<T>(&mut self, result: std::io::Result<T>) -> Result<T, DecodeError> {
        let restored = self.stream.seek(SeekFrom::Start(self.restore));
        let value = result.map_err(|err| DecodeError::Probe(err.to_string()))?;
        restored.map_err(|err| DecodeError::Probe(err.to_string()))?;
        Ok(value)
    }
}

impl<S: Read + Seek> Probe for StreamProbe<'_, S> {
    fn len(&mut self) -> Result<u64, DecodeError> {
        let result = self.stream.seek(SeekFrom::End(0));
        self.settle(result)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError> {
        let result = self
            .stream
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.stream.read_exact(buf));
        self.settle(result)
    }
}
