//! Feature extraction
//!
//! Events are reduced to a stable categorical code for the event kind.
//! The code is derived from SHA-256 so it stays identical across processes
//! and releases, which persisted history depends on.

use sha2::{Digest, Sha256};

use crate::types::InteractionEvent;

/// Categorical features of one event
#[derive(Debug, Clone, PartialEq)]
pub struct EventFeatures {
    pub kind_code: i32,
    pub kind: String,
}

/// Stable code for an event kind
pub fn kind_code(kind: &str) -> i32 {
    let digest = Sha256::digest(kind.as_bytes());
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub fn extract(event: &InteractionEvent) -> EventFeatures {
    EventFeatures {
        kind_code: kind_code(&event.kind),
        kind: event.kind.clone(),
    }
}
