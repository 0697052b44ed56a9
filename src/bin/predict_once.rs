//! One-shot flood prediction
//!
//! Loads the configured models, submits a single reading through the full
//! pipeline (store raw reading, assemble window, classify, store
//! prediction) and prints the result as JSON.
//!
//! Usage:
//!   cargo run --bin predict_once
//!   cargo run --bin predict_once -- --memory-store
//!   cargo run --bin predict_once -- '{"temperature": 25.8, "humidity": 80.5,
//!       "rain": 10.2, "pressure": 1010.5, "soil_moisture": 0.75}'
//!
//! Environment:
//!   DATABASE_URL   - PostgreSQL connection string (unless --memory-store)
//!   FLOPRED_CONFIG - config file path (default: predictor.toml)

use flopred_service::config::load_config;
use flopred_service::daemon::{Daemon, StoreBackend};
use serde_json::{Value, json};

fn sample_reading() -> Value {
    json!({
        "temperature": 25.8,
        "humidity": 80.5,
        "rain": 10.2,
        "pressure": 1010.5,
        "soil_moisture": 0.75
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = StoreBackend::Postgres;
    let mut payload = sample_reading();

    for arg in std::env::args().skip(1) {
        if arg == "--memory-store" {
            backend = StoreBackend::Memory;
        } else {
            payload = serde_json::from_str(&arg)
                .map_err(|e| format!("reading must be a JSON object: {}", e))?;
        }
    }

    let config = load_config()?;
    let mut daemon = Daemon::new(config, backend);
    let telemetry = daemon.telemetry().clone();

    telemetry.scope(|| -> Result<(), Box<dyn std::error::Error>> {
        if let Err(e) = daemon.initialize() {
            eprintln!("\n❌ Initialization failed: {}\n", e);
            std::process::exit(1);
        }
        let pipeline = daemon.pipeline().ok_or("pipeline not initialized")?;

        let outcome = pipeline.submit_reading(&payload)?;
        let result = match &outcome.prediction {
            Ok(prediction) => serde_json::to_value(prediction.report())?,
            Err(e) => json!({
                "error": e.to_string(),
                "timestamp": outcome.reading.timestamp,
                "24h_risk": Value::Null,
                "48h_risk": Value::Null,
            }),
        };

        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    })
}
