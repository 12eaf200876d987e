//! User instructions
//!
//! Instructions constrain what the container trains on and which predictions
//! it is allowed to surface. Evaluation is pure: the result never depends on
//! the order instructions are given in.

pub mod parser;

use serde::Serialize;

use crate::types::{InteractionEvent, Prediction};

pub use parser::parse_instructions;

/// A single user rule.
///
/// New rules are added as new variants; every consumer matches exhaustively
/// so an added variant is a compile error until it is handled everywhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    /// Never train on events of this kind (exact, case-sensitive match)
    SuppressCategory { kind: String },
    /// Never surface predictions below this confidence. Evaluated clamped
    /// to [0, 1]; NaN imposes no constraint.
    MinConfidence { threshold: f32 },
}

impl Instruction {
    pub fn suppress_category(kind: impl Into<String>) -> Self {
        Instruction::SuppressCategory { kind: kind.into() }
    }

    /// Threshold rule, clamped to [0, 1]. NaN becomes 0.
    pub fn min_confidence(threshold: f32) -> Self {
        Instruction::MinConfidence {
            threshold: clamp_threshold(threshold).unwrap_or(0.0),
        }
    }
}

fn clamp_threshold(threshold: f32) -> Option<f32> {
    if threshold.is_nan() {
        None
    } else {
        Some(threshold.clamp(0.0, 1.0))
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::SuppressCategory { kind } => write!(f, "{}={}", parser::SUPPRESS_CATEGORY, kind),
            Instruction::MinConfidence { threshold } => write!(f, "{}={}", parser::MIN_CONFIDENCE, threshold),
        }
    }
}

impl std::str::FromStr for Instruction {
    type Err = crate::error::InstructionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_line(s, 1)
    }
}

/// Evaluates instructions against events and predictions
pub struct InstructionEngine;

impl InstructionEngine {
    /// The threshold that applies when several `MinConfidence` rules are present.
    ///
    /// The most restrictive (highest) threshold wins, so the outcome is the
    /// same for any ordering of the rules.
    pub fn effective_min_confidence(instructions: &[Instruction]) -> Option<f32> {
        instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::MinConfidence { threshold } => clamp_threshold(*threshold),
                Instruction::SuppressCategory { .. } => None,
            })
            .fold(None, |acc: Option<f32>, t| Some(acc.map_or(t, |a| a.max(t))))
    }

    /// Drop a prediction whose confidence is below the effective threshold.
    ///
    /// A surviving prediction is returned unchanged.
    pub fn filter(prediction: Prediction, instructions: &[Instruction]) -> Option<Prediction> {
        match Self::effective_min_confidence(instructions) {
            Some(threshold) if prediction.confidence < threshold => None,
            _ => Some(prediction),
        }
    }

    /// Whether an event may be used for training
    pub fn should_train_on(event: &InteractionEvent, instructions: &[Instruction]) -> bool {
        !instructions.iter().any(|i| match i {
            Instruction::SuppressCategory { kind } => *kind == event.kind,
            Instruction::MinConfidence { .. } => false,
        })
    }
}
