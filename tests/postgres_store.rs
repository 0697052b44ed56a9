/// Integration tests for the PostgreSQL store
///
/// Prerequisites:
/// - PostgreSQL running with the flopred_db database
/// - DATABASE_URL set in .env
///
/// The schema is created on demand. Test rows use timestamps far in the
/// past (below `TEST_BASE + 1000`) and are removed before and after each
/// test.
///
/// Run with: cargo test --test postgres_store -- --ignored --test-threads=1

use flopred_service::config::DuplicatePolicy;
use flopred_service::db;
use flopred_service::error::StoreError;
use flopred_service::model::{PredictionRecord, RiskLevel, SensorReading};
use flopred_service::store::{PgStore, PgStoreProvider, StoreProvider, TimeSeriesStore};
use postgres::Client;

const TEST_BASE: i64 = 1_000;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn setup() -> (PgStoreProvider, Client) {
    let url = db::database_url().expect("DATABASE_URL must be set");
    let mut store = PgStore::new(db::connect(&url).expect("Failed to connect to test database"));
    store.ensure_schema().expect("Failed to create schema");

    let mut client = db::connect(&url).expect("Failed to connect to test database");
    cleanup(&mut client);
    (PgStoreProvider::new(url), client)
}

fn cleanup(client: &mut Client) {
    let upper = TEST_BASE + 1_000;
    let _ = client.execute("DELETE FROM flopred.live_dataset WHERE datetime < $1", &[&upper]);
    let _ = client.execute("DELETE FROM flopred.predictions WHERE datetime < $1", &[&upper]);
}

fn reading(offset: i64, rain: f64) -> SensorReading {
    SensorReading {
        timestamp: TEST_BASE + offset,
        temperature: 21.5,
        humidity: 77.0,
        rain,
        pressure: 1009.25,
        soil_moisture: 0.55,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_connect_and_verify_schema() {
    let (_, mut client) = setup();
    assert!(db::verify_schema(&mut client, db::SCHEMA).is_ok());
    assert!(db::connect_and_verify().is_ok());
}

#[test]
#[ignore]
fn test_reading_round_trip_and_ordering() {
    let (provider, mut client) = setup();
    {
        let mut store = provider.acquire().unwrap();
        for offset in [3, 1, 2] {
            let row = reading(offset, offset as f64);
            store.append_reading(&row, DuplicatePolicy::Overwrite).unwrap();
        }

        let all = store.readings_between(TEST_BASE, TEST_BASE + 10).unwrap();
        assert_eq!(all, vec![reading(1, 1.0), reading(2, 2.0), reading(3, 3.0)]);

        let range = store.readings_between(TEST_BASE + 1, TEST_BASE + 2).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].timestamp, TEST_BASE + 1);

        let before = store.readings_before(TEST_BASE + 3, 5).unwrap();
        assert_eq!(before, vec![reading(1, 1.0), reading(2, 2.0)]);
        let newest_only = store.readings_before(TEST_BASE + 3, 1).unwrap();
        assert_eq!(newest_only, vec![reading(2, 2.0)]);
    }
    cleanup(&mut client);
}

#[test]
#[ignore]
fn test_duplicate_policies() {
    let (provider, mut client) = setup();
    {
        let mut store = provider.acquire().unwrap();
        store.append_reading(&reading(5, 1.0), DuplicatePolicy::Overwrite).unwrap();
        store.append_reading(&reading(5, 9.0), DuplicatePolicy::Overwrite).unwrap();
        let rows = store.readings_between(TEST_BASE + 5, TEST_BASE + 5).unwrap();
        assert_eq!(rows, vec![reading(5, 9.0)]);

        let err = store.append_reading(&reading(5, 4.0), DuplicatePolicy::Reject).unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateKey {
                table: "live_dataset",
                timestamp: TEST_BASE + 5
            }
        );
    }
    cleanup(&mut client);
}

#[test]
#[ignore]
fn test_prediction_levels_round_trip() {
    let (provider, mut client) = setup();
    {
        let mut store = provider.acquire().unwrap();
        let record = PredictionRecord {
            timestamp: TEST_BASE + 7,
            risk_24: RiskLevel::Medium,
            risk_48: RiskLevel::High,
        };
        store.append_prediction(&record, DuplicatePolicy::Overwrite).unwrap();

        let rows = store.predictions_between(TEST_BASE, TEST_BASE + 10).unwrap();
        assert_eq!(rows, vec![record]);
    }
    cleanup(&mut client);
}
