//! PostgreSQL-backed time-series store.
//!
//! Tables live in the `flopred` schema (see `sql/001_initial_schema.sql`).
//! Column names follow the dashboard's field names: `relative_humidity` and
//! `surface_pressure` hold `SensorReading::humidity` / `pressure`.
//!
//! `PgStoreProvider::acquire` opens a fresh connection per call; the
//! connection closes when the returned handle is dropped.

use ::postgres::{Client, Row};

use super::{
    LIVE_DATASET, OP_APPEND_PREDICTION, OP_APPEND_READING, OP_READ_LAST_PREDICTIONS,
    OP_READ_LAST_READINGS, OP_READ_PREDICTION_RANGE, OP_READ_READINGS_BEFORE,
    OP_READ_READING_RANGE, PREDICTIONS, StoreProvider, TimeSeriesStore,
};
use crate::config::DuplicatePolicy;
use crate::db;
use crate::error::StoreError;
use crate::model::{PredictionRecord, RiskLevel, SensorReading};

/// DDL for both keyspaces. Safe to run repeatedly.
pub const SCHEMA_SQL: &str = "
CREATE SCHEMA IF NOT EXISTS flopred;

CREATE TABLE IF NOT EXISTS flopred.live_dataset (
    datetime          BIGINT PRIMARY KEY,
    temperature       DOUBLE PRECISION NOT NULL,
    relative_humidity DOUBLE PRECISION NOT NULL,
    rain              DOUBLE PRECISION NOT NULL,
    surface_pressure  DOUBLE PRECISION NOT NULL,
    soil_moisture     DOUBLE PRECISION NOT NULL
);

CREATE TABLE IF NOT EXISTS flopred.predictions (
    datetime      BIGINT PRIMARY KEY,
    prediction_24 SMALLINT NOT NULL CHECK (prediction_24 BETWEEN 0 AND 2),
    prediction_48 SMALLINT NOT NULL CHECK (prediction_48 BETWEEN 0 AND 2)
);
";

const READING_COLUMNS: &str =
    "datetime, temperature, relative_humidity, rain, surface_pressure, soil_moisture";
const PREDICTION_COLUMNS: &str = "datetime, prediction_24, prediction_48";

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Opens one connection per acquired handle.
#[derive(Debug, Clone)]
pub struct PgStoreProvider {
    db_url: String,
}

impl PgStoreProvider {
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
        }
    }

    /// Builds a provider from DATABASE_URL, creating the schema and tables
    /// on first start, then checks access once.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let db_url = db::database_url()?;
        let mut store = PgStore::new(db::connect(&db_url)?);
        store.ensure_schema()?;
        db::verify_schema(&mut store.client, db::SCHEMA)?;
        Ok(Self::new(db_url))
    }
}

impl StoreProvider for PgStoreProvider {
    fn acquire(&self) -> Result<Box<dyn TimeSeriesStore>, StoreError> {
        let client = db::connect(&self.db_url).map_err(|e| match e {
            db::DbConfigError::ConnectionFailed(inner) => StoreError::Connection(inner.to_string()),
            other => StoreError::Connection(other.to_string()),
        })?;
        Ok(Box::new(PgStore::new(client)))
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub struct PgStore {
    client: Client,
}

impl PgStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates the schema and tables if missing.
    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.client
            .batch_execute(SCHEMA_SQL)
            .map_err(|e| StoreError::operation("ensure_schema", e))
    }
}

fn reading_from_row(row: &Row) -> SensorReading {
    SensorReading {
        timestamp: row.get(0),
        temperature: row.get(1),
        humidity: row.get(2),
        rain: row.get(3),
        pressure: row.get(4),
        soil_moisture: row.get(5),
    }
}

fn prediction_from_row(
    row: &Row,
    operation: &'static str,
) -> Result<PredictionRecord, StoreError> {
    let level = |idx: usize| -> Result<RiskLevel, StoreError> {
        let raw: i16 = row.get(idx);
        usize::try_from(raw)
            .ok()
            .and_then(RiskLevel::from_index)
            .ok_or_else(|| {
                StoreError::operation(operation, format!("stored risk level {} out of range", raw))
            })
    };

    Ok(PredictionRecord {
        timestamp: row.get(0),
        risk_24: level(1)?,
        risk_48: level(2)?,
    })
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl TimeSeriesStore for PgStore {
    fn append_reading(
        &mut self,
        reading: &SensorReading,
        policy: DuplicatePolicy,
    ) -> Result<(), StoreError> {
        let conflict = match policy {
            DuplicatePolicy::Overwrite => {
                "ON CONFLICT (datetime) DO UPDATE SET
                    temperature = EXCLUDED.temperature,
                    relative_humidity = EXCLUDED.relative_humidity,
                    rain = EXCLUDED.rain,
                    surface_pressure = EXCLUDED.surface_pressure,
                    soil_moisture = EXCLUDED.soil_moisture"
            }
            DuplicatePolicy::Reject => "ON CONFLICT (datetime) DO NOTHING",
        };
        let sql = format!(
            "INSERT INTO flopred.live_dataset ({}) VALUES ($1, $2, $3, $4, $5, $6) {}",
            READING_COLUMNS, conflict
        );

        let rows_affected = self
            .client
            .execute(
                sql.as_str(),
                &[
                    &reading.timestamp,
                    &reading.temperature,
                    &reading.humidity,
                    &reading.rain,
                    &reading.pressure,
                    &reading.soil_moisture,
                ],
            )
            .map_err(|e| StoreError::operation(OP_APPEND_READING, e))?;

        if rows_affected == 0 {
            return Err(StoreError::DuplicateKey {
                table: LIVE_DATASET,
                timestamp: reading.timestamp,
            });
        }
        Ok(())
    }

    fn append_prediction(
        &mut self,
        record: &PredictionRecord,
        policy: DuplicatePolicy,
    ) -> Result<(), StoreError> {
        let conflict = match policy {
            DuplicatePolicy::Overwrite => {
                "ON CONFLICT (datetime) DO UPDATE SET
                    prediction_24 = EXCLUDED.prediction_24,
                    prediction_48 = EXCLUDED.prediction_48"
            }
            DuplicatePolicy::Reject => "ON CONFLICT (datetime) DO NOTHING",
        };
        let sql = format!(
            "INSERT INTO flopred.predictions ({}) VALUES ($1, $2, $3) {}",
            PREDICTION_COLUMNS, conflict
        );

        let risk_24 = record.risk_24.index() as i16;
        let risk_48 = record.risk_48.index() as i16;
        let rows_affected = self
            .client
            .execute(sql.as_str(), &[&record.timestamp, &risk_24, &risk_48])
            .map_err(|e| StoreError::operation(OP_APPEND_PREDICTION, e))?;

        if rows_affected == 0 {
            return Err(StoreError::DuplicateKey {
                table: PREDICTIONS,
                timestamp: record.timestamp,
            });
        }
        Ok(())
    }

    fn last_readings(&mut self, n: usize) -> Result<Vec<SensorReading>, StoreError> {
        let sql = format!(
            "SELECT {} FROM flopred.live_dataset ORDER BY datetime DESC LIMIT $1",
            READING_COLUMNS
        );
        let rows = self
            .client
            .query(sql.as_str(), &[&limit(n)])
            .map_err(|e| StoreError::operation(OP_READ_LAST_READINGS, e))?;

        let mut readings: Vec<SensorReading> = rows.iter().map(reading_from_row).collect();
        readings.reverse();
        Ok(readings)
    }

    fn readings_before(
        &mut self,
        before: i64,
        n: usize,
    ) -> Result<Vec<SensorReading>, StoreError> {
        let sql = format!(
            "SELECT {} FROM flopred.live_dataset WHERE datetime < $1 \
             ORDER BY datetime DESC LIMIT $2",
            READING_COLUMNS
        );
        let rows = self
            .client
            .query(sql.as_str(), &[&before, &limit(n)])
            .map_err(|e| StoreError::operation(OP_READ_READINGS_BEFORE, e))?;

        let mut readings: Vec<SensorReading> = rows.iter().map(reading_from_row).collect();
        readings.reverse();
        Ok(readings)
    }

    fn last_predictions(&mut self, n: usize) -> Result<Vec<PredictionRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM flopred.predictions ORDER BY datetime DESC LIMIT $1",
            PREDICTION_COLUMNS
        );
        let rows = self
            .client
            .query(sql.as_str(), &[&limit(n)])
            .map_err(|e| StoreError::operation(OP_READ_LAST_PREDICTIONS, e))?;

        let mut records = rows
            .iter()
            .map(|row| prediction_from_row(row, OP_READ_LAST_PREDICTIONS))
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    fn readings_between(&mut self, start: i64, end: i64) -> Result<Vec<SensorReading>, StoreError> {
        let sql = format!(
            "SELECT {} FROM flopred.live_dataset \
             WHERE datetime BETWEEN $1 AND $2 ORDER BY datetime",
            READING_COLUMNS
        );
        let rows = self
            .client
            .query(sql.as_str(), &[&start, &end])
            .map_err(|e| StoreError::operation(OP_READ_READING_RANGE, e))?;

        Ok(rows.iter().map(reading_from_row).collect())
    }

    fn predictions_between(
        &mut self,
        start: i64,
        end: i64,
    ) -> Result<Vec<PredictionRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM flopred.predictions WHERE datetime BETWEEN $1 AND $2 ORDER BY datetime",
            PREDICTION_COLUMNS
        );
        let rows = self
            .client
            .query(sql.as_str(), &[&start, &end])
            .map_err(|e| StoreError::operation(OP_READ_PREDICTION_RANGE, e))?;

        rows.iter()
            .map(|row| prediction_from_row(row, OP_READ_PREDICTION_RANGE))
            .collect()
    }
}
