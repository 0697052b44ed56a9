//! Shared data types for the flood prediction service.
//!
//! A `SensorReading` is one row of the `live_dataset` keyspace and a
//! `PredictionRecord` one row of `predictions`. Both are keyed by integer
//! epoch seconds.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Shape constants
// ---------------------------------------------------------------------------

/// Number of timesteps the classifiers were trained on.
pub const WINDOW_LENGTH: usize = 30;

/// Features per timestep, in model input order.
pub const FEATURE_COUNT: usize = 5;

/// Number of risk classes each classifier scores.
pub const RISK_CLASSES: usize = 3;

/// Feature names in model input order. These are also the required payload
/// field names accepted by the validator.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["temperature", "humidity", "rain", "pressure", "soil_moisture"];

/// One timestep of model input.
pub type FeatureVector = [f64; FEATURE_COUNT];

// ---------------------------------------------------------------------------
// Sensor readings
// ---------------------------------------------------------------------------

/// A validated environmental sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Epoch seconds, assigned at ingestion. Natural key in `live_dataset`.
    pub timestamp: i64,
    /// Air temperature, °C.
    pub temperature: f64,
    /// Relative humidity, %.
    pub humidity: f64,
    /// Rainfall, mm.
    pub rain: f64,
    /// Surface pressure, hPa.
    pub pressure: f64,
    pub soil_moisture: f64,
}

impl SensorReading {
    /// Feature vector in `FEATURE_NAMES` order.
    pub fn features(&self) -> FeatureVector {
        [
            self.temperature,
            self.humidity,
            self.rain,
            self.pressure,
            self.soil_moisture,
        ]
    }
}

// ---------------------------------------------------------------------------
// Risk taxonomy
// ---------------------------------------------------------------------------

/// Discrete classifier output. The decision rule is a bare argmax over the
/// three class probabilities; the labels below are display text only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskLevel {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; RISK_CLASSES] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Dashboard label for this level.
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low Risk (Below 50%)",
            RiskLevel::Medium => "Medium Risk (75% - 90%)",
            RiskLevel::High => "High Risk (Above 90%)",
        }
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> u8 {
        level.index()
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        RiskLevel::from_index(value as usize)
            .ok_or_else(|| format!("risk level must be 0, 1 or 2, got {}", value))
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Persisted outcome of one inference cycle. Append-only, keyed by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: i64,
    pub risk_24: RiskLevel,
    pub risk_48: RiskLevel,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
