//! Learned-state codec
//!
//! Binary layout of schema version 1, all fields big-endian:
//!
//! ```text
//! [learning_rate: f32][interaction_count: u64][history_window_size: u32][entry: i32] * min(size, 10)
//! ```
//!
//! `history_window_size` records how long the live window was; only the
//! [`PERSISTED_HISTORY`] most recent entries are written after it. A decoded
//! model therefore resumes with at most ten history entries, oldest first.

use std::collections::VecDeque;

use crate::error::DecodeError;
use crate::types::LearnedState;

/// Schema version written next to every payload produced by this codec
pub const STATE_SCHEMA_VERSION: i32 = 1;

/// Number of most recent history entries kept in a persisted state
pub const PERSISTED_HISTORY: usize = 10;

const HEADER_LEN: usize = 4 + 8 + 4;

/// The model parameters that survive a save/restore cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub learning_rate: f32,
    pub interaction_count: u64,
    /// Feature codes, oldest first
    pub history: VecDeque<i32>,
}

impl ModelParameters {
    pub fn blank(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            interaction_count: 0,
            history: VecDeque::new(),
        }
    }
}

/// Encode parameters into the version 1 payload
pub fn encode(params: &ModelParameters) -> Vec<u8> {
    let window = params.history.len();
    let kept = window.min(PERSISTED_HISTORY);

    let mut buf = Vec::with_capacity(HEADER_LEN + kept * 4);
    buf.extend_from_slice(&params.learning_rate.to_be_bytes());
    buf.extend_from_slice(&params.interaction_count.to_be_bytes());
    buf.extend_from_slice(&(window.min(u32::MAX as usize) as u32).to_be_bytes());
    for entry in params.history.iter().skip(window - kept) {
        buf.extend_from_slice(&entry.to_be_bytes());
    }
    buf
}

/// Encode parameters and wrap them with the schema version
pub fn encode_state(params: &ModelParameters) -> LearnedState {
    LearnedState::new(encode(params), STATE_SCHEMA_VERSION)
}

/// Decode a version 1 payload.
///
/// Either every field is read and validated or an error is returned; no
/// partially-filled parameters ever leave this function.
pub fn decode(bytes: &[u8]) -> Result<ModelParameters, DecodeError> {
    let mut reader = Reader::new(bytes);

    let learning_rate = f32::from_be_bytes(reader.take::<4>("learning_rate")?);
    if !learning_rate.is_finite() || learning_rate <= 0.0 || learning_rate > 1.0 {
        return Err(DecodeError::InvalidLearningRate(learning_rate));
    }
    let interaction_count = u64::from_be_bytes(reader.take::<8>("interaction_count")?);
    let window = u32::from_be_bytes(reader.take::<4>("history_window_size")?) as usize;

    let stored = window.min(PERSISTED_HISTORY);
    let mut history = VecDeque::with_capacity(stored);
    for _ in 0..stored {
        history.push_back(i32::from_be_bytes(reader.take::<4>("history_entry")?));
    }

    if reader.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(ModelParameters {
        learning_rate,
        interaction_count,
        history,
    })
}

/// Check the schema version, then decode the payload
pub fn decode_state(state: &LearnedState) -> Result<ModelParameters, DecodeError> {
    if state.schema_version != STATE_SCHEMA_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: state.schema_version,
            expected: STATE_SCHEMA_VERSION,
        });
    }
    decode(&state.payload)
}

/// Bounds-checked cursor over the payload
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        if self.remaining() < N {
            return Err(DecodeError::Truncated {
                field,
                needed: N,
                available: self.remaining(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}
