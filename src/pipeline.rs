//! Flood prediction pipeline.
//!
//! `FloodPipeline` is the surface the API layer talks to. One call to
//! `submit_reading` runs a full cycle:
//!
//! 1. validate the payload and stamp it with the clock
//! 2. under the ingest lock: persist the raw reading, read back the most
//!    recent history rows older than it
//! 3. assemble the rolling window, scale it, run both classifiers
//! 4. encode and persist the prediction
//!
//! Steps 1-2 decide whether the reading is accepted. Steps 3-4 produce the
//! prediction outcome, whose failure never undoes an accepted reading.
//! Every operation acquires its own store handle and drops it before
//! returning.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::{
    HistoryError, LookupError, NotFoundError, PredictionError, StoreError, SubmitError,
};
use crate::inference::encoder::{self, PredictionOutcome};
use crate::inference::orchestrator::{InferenceOrchestrator, ModelBundle};
use crate::inference::validator::{self, RangeWarning};
use crate::inference::window::WindowAssembler;
use crate::model::{PredictionRecord, SensorReading};
use crate::store::{StoreProvider, TimeSeriesStore};
use crate::telemetry::Telemetry;

/// Largest accepted `days` for history queries.
pub const MAX_HISTORY_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 86_400;

/// Result of a submission whose raw reading was accepted. A rejected
/// submission is a `SubmitError` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub reading: SensorReading,
    pub warnings: Vec<RangeWarning>,
    pub prediction: Result<PredictionOutcome, PredictionError>,
}

pub struct FloodPipeline {
    bundle: Arc<ModelBundle>,
    store: Arc<dyn StoreProvider>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    assembler: WindowAssembler,
    orchestrator: InferenceOrchestrator,
    telemetry: Telemetry,
    ingest_lock: Mutex<()>,
}

impl FloodPipeline {
    pub fn new(
        bundle: Arc<ModelBundle>,
        store: Arc<dyn StoreProvider>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
        telemetry: Telemetry,
    ) -> Self {
        let assembler = WindowAssembler::new(config.window_length, config.short_window_policy);
        let orchestrator = InferenceOrchestrator::new(
            config.inference_workers,
            config.classifier_timeout(),
            config.probability_tolerance,
            telemetry.clone(),
        );

        Self {
            bundle,
            store,
            clock,
            config,
            assembler,
            orchestrator,
            telemetry,
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Validates, stores and predicts on one reading payload.
    pub fn submit_reading(&self, payload: &Value) -> Result<SubmitOutcome, SubmitError> {
        self.telemetry.scope(|| self.submit(payload))
    }

    fn submit(&self, payload: &Value) -> Result<SubmitOutcome, SubmitError> {
        let timestamp = self.clock.now_epoch();
        let validated = validator::validate_payload(payload, timestamp).inspect_err(|e| {
            warn!(field = e.field(), error = %e, "Rejected sensor reading");
        })?;
        let reading = validated.reading;
        info!(timestamp, "Received new sensor data");

        let mut handle = self.acquire()?;

        let history = {
            let _guard = self
                .ingest_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            handle
                .append_reading(&reading, self.config.duplicate_timestamp_policy)
                .inspect_err(|e| log_store_error("Failed to store sensor reading", e))?;
            debug!(timestamp, "Stored sensor reading");

            handle
                .readings_before(reading.timestamp, self.assembler.history_needed())
                .inspect_err(|e| log_store_error("Failed to read history window", e))
        };

        let prediction = match history {
            Ok(history) => self.predict(handle.as_mut(), history, reading),
            Err(e) => Err(PredictionError::Store(e)),
        };

        match &prediction {
            Ok(outcome) => {
                debug!(timestamp = outcome.record.timestamp, "Prediction cycle finished")
            }
            Err(e) => error!(timestamp, error = %e, "Error in prediction; reading kept"),
        }

        Ok(SubmitOutcome {
            reading,
            warnings: validated.warnings,
            prediction,
        })
    }

    fn predict(
        &self,
        store: &mut dyn TimeSeriesStore,
        history: Vec<SensorReading>,
        reading: SensorReading,
    ) -> Result<PredictionOutcome, PredictionError> {
        let assembled = self.assembler.assemble(history, reading)?;
        debug!(
            window = assembled.window.len(),
            history_used = assembled.history_used,
            padded = assembled.padded,
            "Rolling window ready"
        );

        let tensor = self.bundle.scaler.transform(&assembled.window);
        let dual = self.orchestrator.run(&self.bundle, tensor)?;

        let timestamp = self.clock.now_epoch().max(reading.timestamp);
        let outcome = encoder::encode(&dual, timestamp);
        encoder::persist(store, &outcome, self.config.duplicate_timestamp_policy)?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn latest_reading(&self) -> Result<SensorReading, LookupError> {
        self.telemetry.scope(|| self.read_latest_reading())
    }

    pub fn latest_prediction(&self) -> Result<PredictionRecord, LookupError> {
        self.telemetry.scope(|| self.read_latest_prediction())
    }

    /// Readings from the last `days` days, oldest first.
    ///
    /// `days` outside `1..=30` is rejected before any store access.
    pub fn history(&self, days: i64) -> Result<Vec<SensorReading>, HistoryError> {
        self.telemetry.scope(|| self.read_history(days))
    }

    /// Predictions from the last `days` days, oldest first.
    pub fn prediction_history(&self, days: i64) -> Result<Vec<PredictionRecord>, HistoryError> {
        self.telemetry.scope(|| self.read_prediction_history(days))
    }

    fn read_latest_reading(&self) -> Result<SensorReading, LookupError> {
        let mut handle = self.acquire()?;
        let mut rows = handle
            .last_readings(1)
            .inspect_err(|e| log_store_error("Failed to read latest reading", e))?;
        match rows.pop() {
            Some(reading) => Ok(reading),
            None => {
                warn!("No entries found in live_dataset");
                Err(NotFoundError::NoReadings.into())
            }
        }
    }

    fn read_latest_prediction(&self) -> Result<PredictionRecord, LookupError> {
        let mut handle = self.acquire()?;
        let mut rows = handle
            .last_predictions(1)
            .inspect_err(|e| log_store_error("Failed to read latest prediction", e))?;
        match rows.pop() {
            Some(record) => Ok(record),
            None => {
                warn!("No entries found in predictions");
                Err(NotFoundError::NoPredictions.into())
            }
        }
    }

    fn read_history(&self, days: i64) -> Result<Vec<SensorReading>, HistoryError> {
        let (start, end) = self.history_range(days)?;
        let mut handle = self.acquire()?;
        let rows = handle
            .readings_between(start, end)
            .inspect_err(|e| log_store_error("Failed to read reading history", e))?;
        debug!(days, rows = rows.len(), "Reading history loaded");
        Ok(rows)
    }

    fn read_prediction_history(&self, days: i64) -> Result<Vec<PredictionRecord>, HistoryError> {
        let (start, end) = self.history_range(days)?;
        let mut handle = self.acquire()?;
        let rows = handle
            .predictions_between(start, end)
            .inspect_err(|e| log_store_error("Failed to read prediction history", e))?;
        debug!(days, rows = rows.len(), "Prediction history loaded");
        Ok(rows)
    }

    fn history_range(&self, days: i64) -> Result<(i64, i64), HistoryError> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            warn!(days, "Rejected history query");
            return Err(HistoryError::InvalidDays(days));
        }
        let end = self.clock.now_epoch();
        Ok((end - days * SECONDS_PER_DAY, end))
    }

    fn acquire(&self) -> Result<Box<dyn TimeSeriesStore>, StoreError> {
        self.store
            .acquire()
            .inspect_err(|e| log_store_error("Failed to acquire store handle", e))
    }
}

fn log_store_error(message: &str, err: &StoreError) {
    match err {
        StoreError::Operation { operation, .. } => {
            error!(operation = *operation, error = %err, "{}", message)
        }
        _ => error!(error = %err, "{}", message),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
