//! Persisted parser state.

use serde::{Deserialize, Serialize};

use crate::{Error, particle::Timestamp};

/// Everything needed to resume parsing a stream with identical output.
///
/// A state is replaced wholesale after every consumed chunk and never mutated
/// by more than one path. Its JSON encoding is the canonical persisted form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParserState {
    /// Stream offset of the first byte not yet fully consumed.
    pub position: u64,
    /// Particles already delivered from the chunk starting at `position`.
    #[serde(default)]
    pub chunk_progress: u32,
    /// Whether a once-per-stream metadata particle has been emitted.
    #[serde(default)]
    pub metadata_sent: bool,
    /// The hardware counter value at the session origin.
    #[serde(default)]
    pub time_anchor: Option<u32>,
    /// The field flags of a control record, once read.
    #[serde(default)]
    pub field_flags: Option<Vec<bool>>,
    /// Where a flag-governed stream is in its layout.
    #[serde(default)]
    pub phase: LayoutPhase,
    /// The time window declared for the records of a flag-governed stream.
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Data records consumed within the current layout.
    #[serde(default)]
    pub records_read: u32,
}

/// The sections of a stream whose layout is declared by a control record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPhase {
    /// Expecting the control record.
    #[default]
    Control,
    /// Expecting data records or the sentinel ending them.
    Data,
    /// Expecting the trailing time record.
    Trailer,
    /// The layout is complete; anything further is non-data.
    Done,
}

/// A sampling window declared once for a run of records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    pub time_on: Timestamp,
    pub time_off: Timestamp,
    /// Number of records sampled across the window.
    pub count: u32,
}

impl ParserState {
    /// The initial state of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// A state starting at a stream offset with default flags.
    pub fn at(position: u64) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// The same state, moved to a new position outside of any chunk.
    pub fn moved_to(&self, position: u64) -> Self {
        Self {
            position,
            chunk_progress: 0,
            ..self.clone()
        }
    }

    /// Decode a persisted state.
    ///
    /// Missing keys, mistyped values, unknown keys and a container other than
    /// an object are all invalid.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(|err| Error::InvalidState(err.to_string()))
    }

    /// Decode a persisted state from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|err| Error::InvalidState(err.to_string()))
    }

    /// Encode the state for persistence.
    pub fn to_json(&self) -> String {
        // Serializing plain data to a string cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
