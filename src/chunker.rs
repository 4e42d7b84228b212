//! A growable byte buffer scanned for record boundaries.
//!
//! The [`Chunker`] accounts for every byte it is fed exactly once: each byte
//! is returned inside either a [`Chunk`] (a candidate record) or a
//! [`NonDataSpan`] (bytes between records). Offsets are absolute stream
//! offsets, so a chunker can be reset to resume anywhere in a stream.

pub mod sieve;

use either::Either::{Left, Right};
use tracing::trace;

pub use sieve::{
    LengthEncoding, LengthField, Match, PatternSieve, PrefixSieve, SievePolicy, Skip, TagSpec,
    TaggedSieve,
};

/// Noise shorter than this is held until a record, a benign span or the end
/// of the stream ends it, so a run of noise is reported whole.
pub const NOISE_SPAN: usize = 4096;

/// A byte span the sieve identified as a plausible record.
///
/// Chunks borrow the chunker's buffer and live only until its next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub start: u64,
    pub end: u64,
    pub bytes: &'a [u8],
    /// Index of the matching pattern, for pattern-based sieves.
    pub pattern: Option<usize>,
}

/// Bytes between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonDataSpan<'a> {
    pub start: u64,
    pub end: u64,
    pub bytes: &'a [u8],
    /// Whether the bytes are a known, harmless artifact rather than noise.
    pub benign: bool,
}

impl NonDataSpan<'_> {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A non-data span and a chunk, in stream order.
pub type Piece<'a> = (Option<NonDataSpan<'a>>, Option<Chunk<'a>>);

#[derive(Debug)]
pub struct Chunker {
    policy: SievePolicy,
    buffer: Vec<u8>,
    /// Stream offset of the first buffered byte.
    base: u64,
    /// Buffered bytes already returned.
    cursor: usize,
}

impl Chunker {
    /// Create an empty chunker whose first fed byte is at stream offset
    /// `base`.
    pub fn new(policy: SievePolicy, base: u64) -> Self {
        Self {
            policy,
            buffer: Vec::new(),
            base,
            cursor: 0,
        }
    }

    /// Append bytes read from the stream.
    pub fn feed(&mut self, r: &[u8]) {
        self.buffer.extend_from_slice(r);
    }

    /// Replace the sieve policy. Bytes not yet returned are scanned with the
    /// new policy.
    pub fn set_policy(&mut self, policy: SievePolicy) {
        self.policy = policy;
    }

    /// Discard all buffered bytes and restart at stream offset `base`.
    pub fn reset(&mut self, base: u64) {
        self.buffer.clear();
        self.base = base;
        self.cursor = 0;
    }

    /// Free bytes already returned.
    pub fn drop_consumed(&mut self) {
        self.buffer.drain(..self.cursor);
        self.base += self.cursor as u64;
        self.cursor = 0;
    }

    /// Stream offset of the next byte to be returned.
    pub fn consumed(&self) -> u64 {
        self.base + self.cursor as u64
    }

    /// Stream offset just past the last buffered byte.
    pub fn tip(&self) -> u64 {
        self.base + self.buffer.len() as u64
    }

    /// Bytes buffered but not yet returned.
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Return the next piece of the stream, or `None` if no further complete
    /// candidate is buffered.
    ///
    /// A piece holds the non-data preceding a chunk together with the chunk.
    /// A benign span, and any noise preceding it, is returned alone, as is a
    /// long run of noise. With `at_end`, the stream has ended and candidates
    /// cut short are treated as noise.
    pub fn next(&mut self, at_end: bool) -> Option<Piece<'_>> {
        let at = self.cursor;
        let scan = self.policy.scan(&self.buffer[at..], at_end)?;

        let piece = match scan {
            Left(Skip::Benign(benign)) if benign.start > 0 => {
                self.cursor = at + benign.start;
                (Some(self.span(at, self.cursor, false)), None)
            }
            Left(Skip::Benign(benign)) => {
                self.cursor = at + benign.end;
                (Some(self.span(at, self.cursor, true)), None)
            }
            Left(Skip::Noise(len)) if at_end || len >= NOISE_SPAN => {
                self.cursor = at + len;
                (Some(self.span(at, self.cursor, false)), None)
            }
            Left(Skip::Noise(_)) => return None,
            Right(Match { range, pattern }) => {
                let (start, end) = (at + range.start, at + range.end);
                self.cursor = end;

                let non_data = (start > at).then(|| self.span(at, start, false));
                let chunk = Chunk {
                    start: self.base + start as u64,
                    end: self.base + end as u64,
                    bytes: &self.buffer[start..end],
                    pattern,
                };

                (non_data, Some(chunk))
            }
        };

        trace!(cursor = self.consumed(), "sieved piece");
        Some(piece)
    }

    /// Return every byte not yet returned as one final span of noise.
    pub fn flush(&mut self) -> Option<NonDataSpan<'_>> {
        let at = self.cursor;
        if at == self.buffer.len() {
            return None;
        }

        self.cursor = self.buffer.len();
        Some(self.span(at, self.cursor, false))
    }

    fn span(&self, start: usize, end: usize, benign: bool) -> NonDataSpan<'_> {
        NonDataSpan {
            start: self.base + start as u64,
            end: self.base + end as u64,
            bytes: &self.buffer[start..end],
            benign,
        }
    }
}
