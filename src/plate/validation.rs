//! Plate grammar: normalisation and format validation of OCR text

use regex::Regex;
use thiserror::Error;

use crate::config::{defaults, PlateConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlateError {
    #[error("plate text is empty")]
    Empty,

    #[error("plate '{text}' is too short ({len} < {min} characters)")]
    TooShort { text: String, len: usize, min: usize },

    #[error("plate '{0}' does not match any accepted plate format")]
    Format(String),

    #[error("invalid plate pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

/// Compiled plate grammar.
///
/// Text is normalised (trimmed, upper-cased) for display and storage; the
/// format check runs on the normalised text with everything except `A-Z0-9`
/// stripped, so `30A-123.45` and `30A12345` are the same plate.
#[derive(Debug, Clone)]
pub struct PlateValidator {
    patterns: Vec<Regex>,
    min_length: usize,
}

impl PlateValidator {
    pub fn new<S: AsRef<str>>(patterns: &[S], min_length: usize) -> Result<Self, PlateError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| PlateError::Pattern {
                    pattern: p.as_ref().to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            min_length,
        })
    }

    pub fn from_config(config: &PlateConfig) -> Result<Self, PlateError> {
        Self::new(&config.patterns, config.min_length)
    }

    pub fn normalize(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// Separator-free form used for matching.
    pub fn clean(normalized: &str) -> String {
        normalized
            .chars()
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            .collect()
    }

    /// Validate raw OCR or operator text, returning the normalised plate.
    pub fn validate(&self, raw: &str) -> Result<String, PlateError> {
        let text = Self::normalize(raw);
        if text.is_empty() {
            return Err(PlateError::Empty);
        }

        let cleaned = Self::clean(&text);
        if cleaned.len() < self.min_length {
            return Err(PlateError::TooShort {
                len: cleaned.len(),
                min: self.min_length,
                text,
            });
        }

        if self.patterns.iter().any(|re| re.is_match(&cleaned)) {
            Ok(text)
        } else {
            Err(PlateError::Format(text))
        }
    }

    pub fn is_valid(&self, raw: &str) -> bool {
        self.validate(raw).is_ok()
    }
}

impl Default for PlateValidator {
    fn default() -> Self {
        Self {
            patterns: defaults::DEFAULT_PLATE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            min_length: defaults::MIN_PLATE_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_known_plate_shapes() {
        let v = PlateValidator::default();
        for plate in ["30A12345", "51F1234", "30AB123456", "123A12345", "59X312345", "29-C1 234.56"] {
            assert!(v.is_valid(plate), "{plate} should be valid");
        }
    }

    #[test]
    fn test_normalises_case_and_whitespace() {
        let v = PlateValidator::default();
        assert_eq!(v.validate("  30a12345 ").unwrap(), "30A12345");
        assert_eq!(v.validate("30a-123.45").unwrap(), "30A-123.45");
    }

    #[test]
    fn test_rejects_garbage() {
        let v = PlateValidator::default();
        assert_eq!(v.validate("???"), Err(PlateError::TooShort { text: "???".into(), len: 0, min: 7 }));
        assert_eq!(v.validate("   "), Err(PlateError::Empty));
        assert!(matches!(v.validate("ABCDEFGH"), Err(PlateError::Format(_))));
        assert!(matches!(v.validate("30A123"), Err(PlateError::TooShort { .. })));
    }

    #[test]
    fn test_custom_grammar() {
        let v = PlateValidator::new(&["^[A-Z]{3}[0-9]{3}$"], 6).unwrap();
        assert!(v.is_valid("abc123"));
        assert!(!v.is_valid("30A12345"));
    }

    #[test]
    fn test_bad_pattern_is_reported() {
        let err = PlateValidator::new(&["^[0-9"], 7).unwrap_err();
        assert!(matches!(err, PlateError::Pattern { .. }));
    }
}
