//! Result encoder and persister.
//!
//! Turns a `DualPrediction` into a `PredictionRecord` plus the dashboard
//! report (risk levels, probabilities and the label taxonomy), and writes
//! the record to the `predictions` keyspace.

use chrono::{Local, TimeZone};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info};

use super::orchestrator::DualPrediction;
use crate::config::DuplicatePolicy;
use crate::error::StoreError;
use crate::model::{PredictionRecord, RiskLevel};
use crate::store::{OP_APPEND_PREDICTION, TimeSeriesStore};

/// Display format shared by prediction reports and API responses.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One successful inference cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub record: PredictionRecord,
    pub probabilities_24: Vec<f64>,
    pub probabilities_48: Vec<f64>,
}

/// Serialized prediction report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
    pub timestamp: i64,
    pub datetime: String,
    #[serde(rename = "24h_risk")]
    pub risk_24: RiskLevel,
    #[serde(rename = "24h_probabilities")]
    pub probabilities_24: Vec<f64>,
    #[serde(rename = "48h_risk")]
    pub risk_48: RiskLevel,
    #[serde(rename = "48h_probabilities")]
    pub probabilities_48: Vec<f64>,
    pub risk_map: BTreeMap<u8, &'static str>,
}

/// Level → label taxonomy. Labels are display text, not thresholds.
pub fn risk_map() -> BTreeMap<u8, &'static str> {
    RiskLevel::ALL.iter().map(|l| (l.index(), l.label())).collect()
}

/// Local-time rendering of an epoch timestamp. Out-of-range values render
/// as the raw number.
pub fn format_epoch(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format(DATETIME_FORMAT).to_string(),
        None => timestamp.to_string(),
    }
}

/// Builds the outcome for a prediction made at `timestamp`.
pub fn encode(prediction: &DualPrediction, timestamp: i64) -> PredictionOutcome {
    PredictionOutcome {
        record: PredictionRecord {
            timestamp,
            risk_24: prediction.h24.risk,
            risk_48: prediction.h48.risk,
        },
        probabilities_24: prediction.h24.probabilities.clone(),
        probabilities_48: prediction.h48.probabilities.clone(),
    }
}

impl PredictionOutcome {
    pub fn report(&self) -> PredictionReport {
        PredictionReport {
            timestamp: self.record.timestamp,
            datetime: format_epoch(self.record.timestamp),
            risk_24: self.record.risk_24,
            probabilities_24: self.probabilities_24.clone(),
            risk_48: self.record.risk_48,
            probabilities_48: self.probabilities_48.clone(),
            risk_map: risk_map(),
        }
    }
}

/// Writes the outcome's record to the `predictions` keyspace.
pub fn persist(
    store: &mut dyn TimeSeriesStore,
    outcome: &PredictionOutcome,
    policy: DuplicatePolicy,
) -> Result<(), StoreError> {
    let record = &outcome.record;
    match store.append_prediction(record, policy) {
        Ok(()) => {
            info!(
                timestamp = record.timestamp,
                risk_24 = record.risk_24.index(),
                risk_48 = record.risk_48.index(),
                "Prediction completed. 24h risk: {}, 48h risk: {}",
                record.risk_24.label(),
                record.risk_48.label()
            );
            Ok(())
        }
        Err(e) => {
            error!(
                operation = OP_APPEND_PREDICTION,
                timestamp = record.timestamp,
                error = %e,
                "Failed to store prediction"
            );
            Err(e)
        }
    }
}
