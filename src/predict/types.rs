//! Prediction service request/response types
//!
//! These types are used for JSON serialization against the prediction service.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Confidence
// ============================================================================

/// Smallest raw value treated as a percentage
const PERCENT_THRESHOLD: f32 = 1.5;

/// Service-reported certainty of a predicted label.
///
/// Stored as a fraction in `0.0..=1.0`. [`Confidence::from_service`] is the
/// only place raw service values enter, and [`Confidence::percent`] is the
/// only conversion for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Confidence(f32);

impl Confidence {
    /// Create from a fraction, clamped into `0.0..=1.0` (NaN becomes 0)
    pub fn from_fraction(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Normalize a raw service value.
    ///
    /// Some service builds report percentages. Values in `1.5..=100` are read
    /// as percent; anything below 1.5 is a fraction and is clamped, so a
    /// slightly overshooting 1.2 shows as 100% rather than 1%.
    pub fn from_service(raw: f32) -> Self {
        if (PERCENT_THRESHOLD..=100.0).contains(&raw) {
            Self::from_fraction(raw / 100.0)
        } else {
            Self::from_fraction(raw)
        }
    }

    pub fn fraction(self) -> f32 {
        self.0
    }

    /// Whole percent in `0..=100`
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// A classified sign
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: Confidence,
}

// ============================================================================
// Wire Types
// ============================================================================

/// `POST /predict` body
#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest<'a> {
    pub landmarks: &'a [f32],
}

/// `POST /predict` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub prediction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /toggle_detection` body
#[derive(Debug, Clone, Serialize)]
pub struct ToggleRequest {
    pub detect: bool,
}

/// `POST /toggle_detection` response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToggleStatus {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub prediction: Option<String>,
}

/// Error body of a non-2xx response (`error`, or FastAPI's `detail`)
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(self) -> Option<String> {
        self.error.or_else(|| {
            self.detail.map(|detail| match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
        })
    }
}
