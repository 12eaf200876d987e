//! Textual instruction format
//!
//! One `key=value` rule per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! min_confidence=0.8
//! suppress_category=noise
//! ```
//!
//! Parsing is all-or-nothing: one bad line rejects the whole input.

use crate::error::InstructionParseError;

use super::Instruction;

pub(crate) const MIN_CONFIDENCE: &str = "min_confidence";
pub(crate) const SUPPRESS_CATEGORY: &str = "suppress_category";

/// Parse a multi-line rule document
pub fn parse_instructions(text: &str) -> Result<Vec<Instruction>, InstructionParseError> {
    let mut instructions = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        instructions.push(parse_line(line, idx + 1)?);
    }
    Ok(instructions)
}

/// Parse a single `key=value` rule
pub(crate) fn parse_line(text: &str, line: usize) -> Result<Instruction, InstructionParseError> {
    let (key, value) = text
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .ok_or_else(|| InstructionParseError::Malformed {
            line,
            text: text.to_string(),
        })?;

    if key.is_empty() {
        return Err(InstructionParseError::Malformed {
            line,
            text: text.to_string(),
        });
    }

    match key {
        MIN_CONFIDENCE => {
            let threshold: f32 = value.parse().map_err(|_| InstructionParseError::InvalidValue {
                line,
                key: key.to_string(),
                value: value.to_string(),
            })?;
            // NaN fails this check too
            if !(0.0..=1.0).contains(&threshold) {
                return Err(InstructionParseError::OutOfRange {
                    line,
                    key: key.to_string(),
                    value: threshold,
                });
            }
            Ok(Instruction::MinConfidence { threshold })
        }
        SUPPRESS_CATEGORY => {
            if value.is_empty() {
                return Err(InstructionParseError::InvalidValue {
                    line,
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            Ok(Instruction::SuppressCategory {
                kind: value.to_string(),
            })
        }
        other => Err(InstructionParseError::UnknownKey {
            line,
            key: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let text = "# user rules\n\nmin_confidence=0.8\n  suppress_category = noise  \n";
        let rules = parse_instructions(text).unwrap();
        assert_eq!(
            rules,
            vec![Instruction::min_confidence(0.8), Instruction::suppress_category("noise")]
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_instructions("min_confidence=0.5\nmax_confidence=0.9").unwrap_err();
        assert_eq!(
            err,
            InstructionParseError::UnknownKey {
                line: 2,
                key: "max_confidence".to_string()
            }
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(matches!(
            parse_instructions("min_confidence=1.5"),
            Err(InstructionParseError::OutOfRange { line: 1, .. })
        ));
        assert!(matches!(
            parse_instructions("min_confidence=-0.1"),
            Err(InstructionParseError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_instructions("min_confidence=NaN"),
            Err(InstructionParseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(matches!(
            parse_instructions("min_confidence=high"),
            Err(InstructionParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_instructions("suppress_category="),
            Err(InstructionParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(matches!(
            parse_instructions("min_confidence 0.5"),
            Err(InstructionParseError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            parse_instructions("=0.5"),
            Err(InstructionParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_boundaries_accepted() {
        assert_eq!(parse_line("min_confidence=0", 1).unwrap(), Instruction::min_confidence(0.0));
        assert_eq!(parse_line("min_confidence=1", 1).unwrap(), Instruction::min_confidence(1.0));
    }
}
