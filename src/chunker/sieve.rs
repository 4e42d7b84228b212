//! Sieve policies locating candidate records in a buffer.
//!
//! A sieve looks only at buffered bytes, so the boundaries it finds are a
//! deterministic function of the buffer's contents. When a candidate might
//! still be completed by bytes not yet buffered, the sieve waits rather than
//! guessing, unless told the stream has ended. Leading bytes that can never
//! begin a record are reported as noise without waiting.

use std::ops::Range;

use either::Either::{self, Left, Right};
use memchr::memmem::Finder;
use regex::bytes::Regex;

use crate::codec::{ChecksumRule, Endian};

/// A candidate record found by a sieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Offsets of the record relative to the scanned region.
    pub range: Range<usize>,
    /// Index of the pattern that matched, for pattern-based sieves.
    pub pattern: Option<usize>,
}

/// Bytes a sieve ruled out as record content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// A known, harmless artifact, possibly preceded by noise.
    Benign(Range<usize>),
    /// This many leading bytes cannot begin a record.
    Noise(usize),
}

/// The outcome of a scan: bytes to skip (left) or a record (right).
pub type Scan = Either<Skip, Match>;

/// How a chunker finds record boundaries.
#[derive(Debug, Clone)]
pub enum SievePolicy {
    /// Structural or literal patterns; the earliest match wins.
    Pattern(PatternSieve),
    /// A discriminator byte selects a length and a checksum.
    Tagged(TaggedSieve),
    /// A header declares the record's byte count.
    LengthPrefixed(PrefixSieve),
    /// Back-to-back records of one width.
    Fixed { width: usize },
}

impl SievePolicy {
    /// Find the first candidate in `r`, or `None` if more bytes are needed.
    ///
    /// With `at_end`, no more bytes will follow, so a candidate cut short is
    /// rejected rather than awaited.
    pub fn scan(&self, r: &[u8], at_end: bool) -> Option<Scan> {
        match self {
            Self::Pattern(sieve) => sieve.scan(r),
            Self::Tagged(sieve) => sieve.scan(r, at_end),
            Self::LengthPrefixed(sieve) => sieve.scan(r, at_end),
            Self::Fixed { width } => (*width != 0 && r.len() >= *width).then(|| {
                Right(Match {
                    range: 0..*width,
                    pattern: None,
                })
            }),
        }
    }
}

/// Matches records and benign artifacts by regular expression.
///
/// Patterns operate on bytes; write them with `(?-u)` (and `(?s)` where `.`
/// must match any byte) to match binary content.
#[derive(Debug, Clone, Default)]
pub struct PatternSieve {
    records: Vec<Regex>,
    benign: Vec<Regex>,
}

impl PatternSieve {
    pub fn new(records: &[&str], benign: &[&str]) -> Result<Self, regex::Error> {
        let compile = |patterns: &[&str]| -> Result<Vec<_>, _> {
            patterns.iter().map(|p| Regex::new(p)).collect()
        };

        Ok(Self {
            records: compile(records)?,
            benign: compile(benign)?,
        })
    }

    fn scan(&self, r: &[u8]) -> Option<Scan> {
        let record = earliest(&self.records, r);
        let benign = earliest(&self.benign, r);

        match (record, benign) {
            (Some((record, _)), Some((benign, _))) if benign.start < record.start => {
                Some(Left(Skip::Benign(benign)))
            }
            (Some((range, pattern)), _) => Some(Right(Match {
                range,
                pattern: Some(pattern),
            })),
            (None, Some((benign, _))) => Some(Left(Skip::Benign(benign))),
            (None, None) => None,
        }
    }
}

/// The earliest non-empty match among `patterns`, with the index of the
/// pattern producing it. Ties go to the earlier pattern.
fn earliest(patterns: &[Regex], r: &[u8]) -> Option<(Range<usize>, usize)> {
    patterns
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.find_iter(r).find(|m| !m.is_empty()).map(|m| (m.range(), i)))
        .min_by_key(|(range, _)| range.start)
}

/// A record introduced by a discriminator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    pub tag: u8,
    /// Total record width, tag and checksum included.
    pub width: usize,
    pub checksum: ChecksumRule,
}

/// Accepts a tagged span only if its checksum verifies, otherwise advances a
/// single byte and retries, resynchronising against noise.
#[derive(Debug, Clone, Default)]
pub struct TaggedSieve {
    tags: Vec<TagSpec>,
}

impl TaggedSieve {
    pub fn new(tags: Vec<TagSpec>) -> Self {
        Self { tags }
    }

    fn scan(&self, r: &[u8], at_end: bool) -> Option<Scan> {
        for (i, b) in r.iter().enumerate() {
            let Some(spec) = self.tags.iter().find(|t| t.tag == *b) else {
                continue;
            };

            let end = i + spec.width;
            let Some(candidate) = r.get(i..end) else {
                if at_end {
                    continue;
                }
                return noise(i);
            };

            if spec.checksum.verify(candidate).is_ok() {
                return Some(Right(Match {
                    range: i..end,
                    pattern: None,
                }));
            }
        }

        noise(r.len())
    }
}

fn noise(len: usize) -> Option<Scan> {
    (len > 0).then_some(Left(Skip::Noise(len)))
}

/// How a length header is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// An unsigned binary integer.
    Binary(Endian),
    /// ASCII hexadecimal digits.
    AsciiHex,
}

/// The location and encoding of a declared byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthField {
    /// Offset from the start of the magic prefix.
    pub offset: usize,
    pub width: usize,
    pub encoding: LengthEncoding,
}

impl LengthField {
    fn read(&self, r: &[u8]) -> Option<usize> {
        match self.encoding {
            LengthEncoding::Binary(endian) => {
                let bytes = r.iter().copied();
                let fold = |acc: usize, b: u8| acc.checked_mul(256)?.checked_add(b.into());
                match endian {
                    Endian::Big => bytes.into_iter().try_fold(0, fold),
                    Endian::Little => bytes.rev().try_fold(0, fold),
                }
            }
            LengthEncoding::AsciiHex => {
                if !r.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                let text = std::str::from_utf8(r).ok()?;
                usize::from_str_radix(text, 16).ok()
            }
        }
    }
}

/// How much of a candidate a prefix sieve has seen.
enum Frame {
    /// A whole record of this many bytes.
    Whole(usize),
    /// Not a record; the search moves on by one byte.
    Rejected,
    /// More bytes are needed to decide.
    Partial,
}

/// Frames records by a magic prefix and a declared length, exposing a record
/// only once all of its bytes are buffered.
#[derive(Debug, Clone)]
pub struct PrefixSieve {
    magic: Finder<'static>,
    length: LengthField,
    /// Bytes in a record beyond the declared count.
    overhead: usize,
    /// Smallest plausible declared count.
    minimum: usize,
    terminator: Option<Vec<u8>>,
    /// A header length and a test every candidate's header must pass.
    header: Option<(usize, fn(&[u8]) -> bool)>,
}

impl PrefixSieve {
    pub fn new(magic: &[u8], length: LengthField, overhead: usize) -> Self {
        Self {
            magic: Finder::new(magic).into_owned(),
            length,
            overhead,
            minimum: 0,
            terminator: None,
            header: None,
        }
    }

    /// Reject declared counts below `minimum`.
    pub fn with_minimum(self, minimum: usize) -> Self {
        Self { minimum, ..self }
    }

    /// Require every record to end with `terminator`.
    pub fn with_terminator(self, terminator: &[u8]) -> Self {
        Self {
            terminator: Some(terminator.to_vec()),
            ..self
        }
    }

    /// Reject candidates whose first `len` bytes fail `check`, before the
    /// rest of the candidate is awaited.
    pub fn with_header_check(self, len: usize, check: fn(&[u8]) -> bool) -> Self {
        Self {
            header: Some((len, check)),
            ..self
        }
    }

    fn scan(&self, r: &[u8], at_end: bool) -> Option<Scan> {
        let mut from = 0;

        loop {
            let Some(found) = self.magic.find(&r[from..]) else {
                // A magic prefix may still straddle the end of the buffer.
                let tail = self.magic.needle().len().saturating_sub(1);
                let undecided = if at_end { r.len() } else { r.len().saturating_sub(tail) };
                return noise(undecided.max(from));
            };

            let start = from + found;
            from = start + 1;

            match self.frame(&r[start..]) {
                Frame::Whole(len) => {
                    return Some(Right(Match {
                        range: start..start + len,
                        pattern: None,
                    }));
                }
                Frame::Rejected => continue,
                Frame::Partial if at_end => continue,
                Frame::Partial => return noise(start),
            }
        }
    }

    /// Frame the candidate at the start of `r`.
    fn frame(&self, r: &[u8]) -> Frame {
        let field = self.length.offset;
        let Some(header) = r.get(field..field + self.length.width) else {
            return Frame::Partial;
        };

        let Some(declared) = self.length.read(header).filter(|n| *n >= self.minimum) else {
            return Frame::Rejected;
        };

        let len = declared + self.overhead;

        if let Some((header_len, check)) = self.header {
            match r.get(..header_len.min(len)) {
                None => return Frame::Partial,
                Some(header) if !check(header) => return Frame::Rejected,
                Some(_) => {}
            }
        }

        let Some(candidate) = r.get(..len) else {
            return Frame::Partial;
        };

        match &self.terminator {
            Some(terminator) if !candidate.ends_with(terminator) => Frame::Rejected,
            _ => Frame::Whole(len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Region, check::sum16};

    fn tagged(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut r = vec![tag];
        r.extend_from_slice(body);
        let sum = sum16(&r);
        r.extend_from_slice(&sum.to_be_bytes());
        r
    }

    fn tag_sieve() -> SievePolicy {
        SievePolicy::Tagged(TaggedSieve::new(vec![TagSpec {
            tag: 0xCB,
            width: 6,
            checksum: ChecksumRule::Sum16 {
                region: Region::trailing(2),
                endian: Endian::Big,
            },
        }]))
    }

    #[test]
    fn tagged_sieve_resynchronises_past_noise() {
        let mut r = vec![0x00, 0xCB, 0x01];
        r.extend(tagged(0xCB, &[1, 2, 3]));

        let scan = tag_sieve().scan(&r, false).unwrap();
        assert_eq!(scan, Right(Match { range: 3..9, pattern: None }));
    }

    #[test]
    fn tagged_sieve_waits_for_incomplete_candidate() {
        let r = tagged(0xCB, &[1, 2, 3]);
        assert_eq!(tag_sieve().scan(&r[..5], false), None);

        let mut r = vec![7, 7];
        r.extend(&tagged(0xCB, &[1, 2, 3])[..4]);
        assert_eq!(tag_sieve().scan(&r, false), Some(Left(Skip::Noise(2))));
    }

    #[test]
    fn tagged_sieve_skips_bytes_without_a_tag() {
        assert_eq!(tag_sieve().scan(&[0; 100], false), Some(Left(Skip::Noise(100))));
        assert_eq!(tag_sieve().scan(&[], false), None);
    }

    #[test]
    fn stray_tag_at_end_of_stream_does_not_hide_a_record() {
        let short = TagSpec {
            tag: 0xCC,
            width: 3,
            checksum: ChecksumRule::Sum16 {
                region: Region::trailing(2),
                endian: Endian::Big,
            },
        };
        let SievePolicy::Tagged(sieve) = tag_sieve() else {
            unreachable!()
        };
        let sieve = SievePolicy::Tagged(TaggedSieve::new([sieve.tags, vec![short]].concat()));

        // The stray tag's span would run past the last byte.
        let mut r = vec![0xCB, 0x00];
        r.extend(tagged(0xCC, &[]));

        assert_eq!(sieve.scan(&r, false), None);
        assert_eq!(
            sieve.scan(&r, true),
            Some(Right(Match { range: 2..5, pattern: None }))
        );
        assert_eq!(sieve.scan(&r[..2], true), Some(Left(Skip::Noise(2))));
    }

    #[test]
    fn earliest_pattern_wins_and_benign_is_left() {
        let sieve = PatternSieve::new(&[r"(?-u)B\d\n", r"(?-u)A\d\n"], &[r"(?-u)#[^\n]*\n"]).unwrap();

        let scan = sieve.scan(b"xxA1\nB2\n").unwrap();
        assert_eq!(scan, Right(Match { range: 2..5, pattern: Some(1) }));

        let scan = sieve.scan(b"x# note\nA1\n").unwrap();
        assert_eq!(scan, Left(Skip::Benign(1..8)));

        assert_eq!(sieve.scan(b"A1"), None);
    }

    fn word_sieve() -> PrefixSieve {
        PrefixSieve::new(
            b"\xFF\x00",
            LengthField {
                offset: 2,
                width: 2,
                encoding: LengthEncoding::Binary(Endian::Big),
            },
            1,
        )
        .with_minimum(4)
    }

    #[test]
    fn prefix_sieve_frames_by_declared_length() {
        let sieve = word_sieve();

        // Declared length 2 is implausible; the real record follows.
        let r = b"\xFF\x00\x00\x02\xFF\x00\x00\x05\xAA\xBB";
        assert_eq!(
            sieve.scan(r, false),
            Some(Right(Match { range: 4..10, pattern: None }))
        );
        assert_eq!(sieve.scan(&r[..9], false), Some(Left(Skip::Noise(4))));
        assert_eq!(sieve.scan(&r[..9], true), Some(Left(Skip::Noise(9))));
    }

    #[test]
    fn prefix_sieve_keeps_a_possible_magic_prefix() {
        let sieve = word_sieve();
        assert_eq!(sieve.scan(b"abcd\xFF", false), Some(Left(Skip::Noise(4))));
        assert_eq!(sieve.scan(b"\xFF", false), None);
        assert_eq!(sieve.scan(b"abcd\xFF", true), Some(Left(Skip::Noise(5))));
    }

    #[test]
    fn prefix_sieve_rejects_headers_failing_the_check() {
        // The byte after the length must repeat its low byte.
        let sieve = word_sieve().with_header_check(5, |h| h[4] == h[3]);

        // A false prefix declaring 9 bytes would swallow the record after it.
        let r = b"\x00\xFF\x00\x00\x09\xFF\x00\x00\x05\x05\xBB";
        assert_eq!(
            sieve.scan(r, false),
            Some(Right(Match { range: 5..11, pattern: None }))
        );
        assert_eq!(
            word_sieve().scan(r, false),
            Some(Right(Match { range: 1..11, pattern: None }))
        );
    }

    #[test]
    fn prefix_sieve_checks_terminator_and_ascii_length() {
        let sieve = PrefixSieve::new(
            b"\x01",
            LengthField {
                offset: 1,
                width: 2,
                encoding: LengthEncoding::AsciiHex,
            },
            4,
        )
        .with_terminator(b"\x03");

        assert_eq!(
            sieve.scan(b"\x01zz\x01\x01\x02\x01\x03", false),
            Some(Left(Skip::Noise(6))),
        );

        let r = b"\x01\x0102\xAA\xBB\x03";
        // The first 0x01 declares a non-hex length; the second frames 6 bytes.
        assert_eq!(
            sieve.scan(r, false),
            Some(Right(Match { range: 1..7, pattern: None }))
        );
    }

    #[test]
    fn fixed_sieve_needs_a_full_width() {
        let sieve = SievePolicy::Fixed { width: 4 };
        assert_eq!(sieve.scan(&[0; 3], true), None);
        assert_eq!(
            sieve.scan(&[0; 9], false),
            Some(Right(Match { range: 0..4, pattern: None }))
        );
    }
}
