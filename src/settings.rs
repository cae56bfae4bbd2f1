//! Per-run detector configuration
//!
//! Settings are produced by an external merge layer (per-project overrides on
//! top of defaults) and consumed here as a read-only record. Construction is
//! the only fallible surface of the crate: a malformed settings object is a
//! configuration error and fails fast, while everything downstream degrades
//! gracefully instead of erroring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for detector settings validation
#[derive(Error, Debug, PartialEq)]
pub enum SettingsError {
    #[error("max_sequence_length must be at least 1")]
    ZeroSequenceLength,

    #[error("minimum_occurrences_of_pattern must be at least 1")]
    ZeroMinimumOccurrences,

    #[error("max_allowable_depth must be at least 1")]
    ZeroAllowableDepth,

    #[error("min_percentage_of_db_spans must be within [0, 1], got {0}")]
    PercentageOutOfRange(f64),

    #[error("total_duration_threshold must be a finite non-negative number, got {0}")]
    InvalidDurationThreshold(f64),
}

/// Tuning knobs for one detection run.
///
/// All durations are milliseconds, matching the unit returned by
/// [`total_span_time`](crate::span::total_span_time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Bound on the lookback window while searching for a pattern start.
    /// Oldest entries are evicted once the window is full.
    pub max_sequence_length: usize,

    /// Minimum number of times a candidate pattern must repeat before it
    /// qualifies as a problem.
    pub minimum_occurrences_of_pattern: usize,

    /// Minimum cumulative duration of all offending spans (milliseconds).
    pub total_duration_threshold: f64,

    /// Minimum fraction (0.0 to 1.0) of offending-span time that must come
    /// from db-op spans.
    pub min_percentage_of_db_spans: f64,

    /// Bound on ancestor-chain hops per span when searching for a common
    /// parent.
    pub max_allowable_depth: usize,

    /// Master gate for problem creation on this project.
    pub detection_enabled: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            max_sequence_length: 50,
            minimum_occurrences_of_pattern: 3,
            total_duration_threshold: 100.0,
            min_percentage_of_db_spans: 0.05,
            max_allowable_depth: 50,
            detection_enabled: true,
        }
    }
}

impl DetectorSettings {
    /// Validate the settings, returning them unchanged on success.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] for out-of-range fields. Callers should
    /// treat this as fatal at startup rather than retrying.
    pub fn validated(self) -> Result<Self, SettingsError> {
        if self.max_sequence_length == 0 {
            return Err(SettingsError::ZeroSequenceLength);
        }
        if self.minimum_occurrences_of_pattern == 0 {
            return Err(SettingsError::ZeroMinimumOccurrences);
        }
        if self.max_allowable_depth == 0 {
            return Err(SettingsError::ZeroAllowableDepth);
        }
        if !(0.0..=1.0).contains(&self.min_percentage_of_db_spans) {
            return Err(SettingsError::PercentageOutOfRange(
                self.min_percentage_of_db_spans,
            ));
        }
        if !self.total_duration_threshold.is_finite() || self.total_duration_threshold < 0.0 {
            return Err(SettingsError::InvalidDurationThreshold(
                self.total_duration_threshold,
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DetectorSettings::default().validated().is_ok());
    }

    #[test]
    fn test_zero_sequence_length_rejected() {
        let settings = DetectorSettings {
            max_sequence_length: 0,
            ..Default::default()
        };
        assert_eq!(
            settings.validated(),
            Err(SettingsError::ZeroSequenceLength)
        );
    }

    #[test]
    fn test_zero_minimum_occurrences_rejected() {
        let settings = DetectorSettings {
            minimum_occurrences_of_pattern: 0,
            ..Default::default()
        };
        assert_eq!(
            settings.validated(),
            Err(SettingsError::ZeroMinimumOccurrences)
        );
    }

    #[test]
    fn test_percentage_out_of_range_rejected() {
        let settings = DetectorSettings {
            min_percentage_of_db_spans: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            settings.validated(),
            Err(SettingsError::PercentageOutOfRange(_))
        ));
    }

    #[test]
    fn test_nan_duration_threshold_rejected() {
        let settings = DetectorSettings {
            total_duration_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            settings.validated(),
            Err(SettingsError::InvalidDurationThreshold(_))
        ));
    }

    #[test]
    fn test_partial_override_deserializes_onto_defaults() {
        let settings: DetectorSettings =
            serde_json::from_str(r#"{"total_duration_threshold": 250.0}"#).unwrap();
        assert_eq!(settings.total_duration_threshold, 250.0);
        assert_eq!(settings.max_sequence_length, 50);
        assert!(settings.detection_enabled);
    }
}
