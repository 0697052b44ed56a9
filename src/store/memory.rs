//! In-process time-series store.
//!
//! Backs the integration tests and `--memory-store` runs. Rows live in
//! `BTreeMap`s keyed by timestamp, so ordering matches the PostgreSQL store.
//! Handles share state through an `Arc<Mutex<_>>`; the store counts open
//! handles so tests can check that every code path releases its handle.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    LIVE_DATASET, OP_APPEND_PREDICTION, OP_APPEND_READING, OP_READ_LAST_PREDICTIONS,
    OP_READ_LAST_READINGS, OP_READ_PREDICTION_RANGE, OP_READ_READINGS_BEFORE,
    OP_READ_READING_RANGE, PREDICTIONS, StoreProvider, TimeSeriesStore,
};
use crate::config::DuplicatePolicy;
use crate::error::StoreError;
use crate::model::{PredictionRecord, SensorReading};

#[derive(Debug, Default)]
struct Inner {
    readings: BTreeMap<i64, SensorReading>,
    predictions: BTreeMap<i64, PredictionRecord>,
    failing: HashSet<&'static str>,
    fail_acquire: bool,
    open_handles: usize,
    acquired: usize,
    writes: usize,
}

/// Shared in-memory store. Cloning yields another view of the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seeds readings directly, bypassing policies and failure injection.
    pub fn seed_readings(&self, readings: impl IntoIterator<Item = SensorReading>) {
        let mut inner = self.lock();
        for reading in readings {
            inner.readings.insert(reading.timestamp, reading);
        }
    }

    /// Makes the named operation fail on every later call.
    pub fn fail_operation(&self, operation: &'static str) {
        self.lock().failing.insert(operation);
    }

    /// Makes `acquire` fail as if the store were unreachable.
    pub fn fail_acquire(&self, fail: bool) {
        self.lock().fail_acquire = fail;
    }

    pub fn reading_count(&self) -> usize {
        self.lock().readings.len()
    }

    pub fn prediction_count(&self) -> usize {
        self.lock().predictions.len()
    }

    /// Successful writes across both keyspaces.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Handles acquired over the store's lifetime.
    pub fn acquire_count(&self) -> usize {
        self.lock().acquired
    }

    /// Handles acquired and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }
}

impl StoreProvider for MemoryStore {
    fn acquire(&self) -> Result<Box<dyn TimeSeriesStore>, StoreError> {
        let mut inner = self.lock();
        if inner.fail_acquire {
            return Err(StoreError::Connection("memory store marked unreachable".into()));
        }
        inner.open_handles += 1;
        inner.acquired += 1;
        drop(inner);

        Ok(Box::new(MemoryHandle {
            store: self.clone(),
        }))
    }
}

/// Scoped handle onto a `MemoryStore`.
struct MemoryHandle {
    store: MemoryStore,
}

impl MemoryHandle {
    fn check(inner: &Inner, operation: &'static str) -> Result<(), StoreError> {
        if inner.failing.contains(operation) {
            return Err(StoreError::operation(operation, "injected failure"));
        }
        Ok(())
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        let mut inner = self.store.lock();
        inner.open_handles = inner.open_handles.saturating_sub(1);
    }
}

fn insert_row<T>(
    rows: &mut BTreeMap<i64, T>,
    table: &'static str,
    timestamp: i64,
    row: T,
    policy: DuplicatePolicy,
) -> Result<(), StoreError> {
    if policy == DuplicatePolicy::Reject && rows.contains_key(&timestamp) {
        return Err(StoreError::DuplicateKey { table, timestamp });
    }
    rows.insert(timestamp, row);
    Ok(())
}

fn last_n<T: Copy>(rows: &BTreeMap<i64, T>, n: usize) -> Vec<T> {
    let mut out: Vec<T> = rows.values().rev().take(n).copied().collect();
    out.reverse();
    out
}

fn between<T: Copy>(rows: &BTreeMap<i64, T>, start: i64, end: i64) -> Vec<T> {
    if start > end {
        return Vec::new();
    }
    rows.range(start..=end).map(|(_, row)| *row).collect()
}

impl TimeSeriesStore for MemoryHandle {
    fn append_reading(
        &mut self,
        reading: &SensorReading,
        policy: DuplicatePolicy,
    ) -> Result<(), StoreError> {
        let mut inner = self.store.lock();
        Self::check(&inner, OP_APPEND_READING)?;
        insert_row(&mut inner.readings, LIVE_DATASET, reading.timestamp, *reading, policy)?;
        inner.writes += 1;
        Ok(())
    }

    fn append_prediction(
        &mut self,
        record: &PredictionRecord,
        policy: DuplicatePolicy,
    ) -> Result<(), StoreError> {
        let mut inner = self.store.lock();
        Self::check(&inner, OP_APPEND_PREDICTION)?;
        insert_row(&mut inner.predictions, PREDICTIONS, record.timestamp, *record, policy)?;
        inner.writes += 1;
        Ok(())
    }

    fn last_readings(&mut self, n: usize) -> Result<Vec<SensorReading>, StoreError> {
        let inner = self.store.lock();
        Self::check(&inner, OP_READ_LAST_READINGS)?;
        Ok(last_n(&inner.readings, n))
    }

    fn readings_before(
        &mut self,
        before: i64,
        n: usize,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let inner = self.store.lock();
        Self::check(&inner, OP_READ_READINGS_BEFORE)?;
        let mut out: Vec<SensorReading> =
            inner.readings.range(..before).rev().take(n).map(|(_, row)| *row).collect();
        out.reverse();
        Ok(out)
    }

    fn last_predictions(&mut self, n: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        let inner = self.store.lock();
        Self::check(&inner, OP_READ_LAST_PREDICTIONS)?;
        Ok(last_n(&inner.predictions, n))
    }

    fn readings_between(&mut self, start: i64, end: i64) -> Result<Vec<SensorReading>, StoreError> {
        let inner = self.store.lock();
        Self::check(&inner, OP_READ_READING_RANGE)?;
        Ok(between(&inner.readings, start, end))
    }

    fn predictions_between(
        &mut self,
        start: i64,
        end: i64,
    ) -> Result<Vec<PredictionRecord>, StoreError> {
        let inner = self.store.lock();
        Self::check(&inner, OP_READ_PREDICTION_RANGE)?;
        Ok(between(&inner.predictions, start, end))
    }
}
