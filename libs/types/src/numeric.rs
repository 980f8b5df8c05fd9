//! Numeric severity score
//!
//! Severities are plain floating-point urgency scores (the dashboard data uses
//! 1..=5, but no range is enforced). Only finite values are representable, so
//! the total order used for ranking agrees with the numeric order.

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Urgency score of a site; higher means more urgent
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(try_from = "f64")]
pub struct Severity(f64);

/// Largest magnitude below which every integer is exactly representable
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

impl Severity {
    /// Create a severity, returning None for NaN or infinite values
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() {
            // normalize -0.0 so Eq agrees with Ord
            Some(Self(value + 0.0))
        } else {
            None
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Rejection for a non-finite severity.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("severity must be a finite number, got {0}")]
pub struct InvalidSeverity(pub f64);

impl TryFrom<f64> for Severity {
    type Error = InvalidSeverity;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidSeverity(value))
    }
}

impl From<Severity> for f64 {
    fn from(s: Severity) -> Self {
        s.0
    }
}

/// Integral scores go out as JSON integers (`5`, not `5.0`), matching how the
/// source data writes them.
impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0.abs() < MAX_EXACT_INT {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl PartialEq for Severity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Severity {}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
