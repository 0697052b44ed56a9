//! flopred_service: sensor-driven 24h / 48h flood risk prediction service.
//!
//! # Module structure
//!
//! ```text
//! flopred_service
//! ├── model       — shared data types (SensorReading, PredictionRecord, RiskLevel)
//! ├── error       — error taxonomy (validation, store, artifact, inference, …)
//! ├── config      — service configuration loader (predictor.toml + environment)
//! ├── telemetry   — injectable logging handle over a tracing Dispatch
//! ├── clock       — epoch-second clock abstraction
//! ├── db          — PostgreSQL connection and schema validation
//! ├── store       — time-series persistence behind scoped handles
//! │   ├── postgres — live_dataset / predictions tables
//! │   └── memory   — in-process store for tests and --memory-store
//! ├── inference
//! │   ├── validator    — payload → SensorReading, soft range checks
//! │   ├── window       — rolling window assembly and short-window policy
//! │   ├── scaler       — fitted feature normalization
//! │   ├── classifier   — Classifier trait + pooled dense model artifact
//! │   ├── orchestrator — ModelBundle, parallel dual-horizon inference
//! │   └── encoder      — PredictionRecord, report payload, persistence
//! ├── pipeline    — submit / latest / history operations
//! ├── endpoint    — HTTP JSON API over the pipeline
//! └── daemon      — startup sequence and serving
//! ```

pub mod clock;
pub mod config;
pub mod daemon;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod telemetry;
