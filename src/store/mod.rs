//! Time-series persistence for readings and predictions.
//!
//! Two append-mostly keyspaces, both keyed by epoch seconds:
//! - `live_dataset` — one `SensorReading` per row
//! - `predictions`  — one `PredictionRecord` per row
//!
//! Callers never hold a store across pipeline cycles. Each operation asks a
//! `StoreProvider` for a scoped handle and drops it when done; dropping the
//! handle releases the underlying connection on every exit path.
//!
//! Submodules:
//! - `postgres` — PostgreSQL tables in the `flopred` schema
//! - `memory`   — in-process store for tests and local runs

pub mod memory;
pub mod postgres;

use crate::config::DuplicatePolicy;
use crate::error::StoreError;
use crate::model::{PredictionRecord, SensorReading};

pub use memory::MemoryStore;
pub use self::postgres::{PgStore, PgStoreProvider};

/// Keyspace names, used in logs and `StoreError::DuplicateKey`.
pub const LIVE_DATASET: &str = "live_dataset";
pub const PREDICTIONS: &str = "predictions";

/// Operation names, used in logs and `StoreError::Operation`.
pub const OP_APPEND_READING: &str = "append_reading";
pub const OP_APPEND_PREDICTION: &str = "append_prediction";
pub const OP_READ_LAST_READINGS: &str = "read_last_n(live_dataset)";
pub const OP_READ_READINGS_BEFORE: &str = "read_last_n_before(live_dataset)";
pub const OP_READ_LAST_PREDICTIONS: &str = "read_last_n(predictions)";
pub const OP_READ_READING_RANGE: &str = "read_range(live_dataset)";
pub const OP_READ_PREDICTION_RANGE: &str = "read_range(predictions)";

/// Key-ordered read/write access to both keyspaces.
///
/// All reads return rows ascending by timestamp and never pad: asking for
/// more rows than exist returns what exists.
pub trait TimeSeriesStore {
    /// Writes a reading at `reading.timestamp`. On a key collision the
    /// policy decides between last-write-wins and `DuplicateKey`.
    fn append_reading(
        &mut self,
        reading: &SensorReading,
        policy: DuplicatePolicy,
    ) -> Result<(), StoreError>;

    fn append_prediction(
        &mut self,
        record: &PredictionRecord,
        policy: DuplicatePolicy,
    ) -> Result<(), StoreError>;

    /// The `n` most recent readings, oldest first.
    fn last_readings(&mut self, n: usize) -> Result<Vec<SensorReading>, StoreError>;

    /// The `n` most recent readings with `timestamp < before`, oldest first.
    fn readings_before(&mut self, before: i64, n: usize) -> Result<Vec<SensorReading>, StoreError>;

    /// The `n` most recent predictions, oldest first.
    fn last_predictions(&mut self, n: usize) -> Result<Vec<PredictionRecord>, StoreError>;

    /// Readings with `start <= timestamp <= end`, oldest first.
    fn readings_between(&mut self, start: i64, end: i64) -> Result<Vec<SensorReading>, StoreError>;

    /// Predictions with `start <= timestamp <= end`, oldest first.
    fn predictions_between(
        &mut self,
        start: i64,
        end: i64,
    ) -> Result<Vec<PredictionRecord>, StoreError>;
}

/// Hands out scoped store handles.
pub trait StoreProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn TimeSeriesStore>, StoreError>;
}
