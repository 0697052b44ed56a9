//! HTTP endpoint for readings and flood predictions
//!
//! Thin JSON layer over `FloodPipeline` for dashboards and sensor gateways.
//!
//! Endpoints:
//! - GET  /api/health                  - Service health check (no key needed)
//! - GET  /api/raw                     - Latest sensor reading
//! - GET  /api/prediction              - Latest prediction
//! - GET  /api/data/history?days=N     - Readings from the last N days (1-30)
//! - GET  /api/prediction/history?days=N - Predictions from the last N days
//! - POST /api/newdata                 - Submit a reading, run a prediction
//!
//! Every route except /api/health requires an `X-API-Key` header matching
//! one of the configured keys, unless key checks are disabled.

use serde_json::{Value, json};
use std::io::Read;
use std::sync::Arc;
use tiny_http::Method;
use tracing::{error, info, warn};

use crate::config::EndpointConfig;
use crate::error::{HistoryError, LookupError, SubmitError};
use crate::inference::encoder::format_epoch;
use crate::model::{PredictionRecord, SensorReading};
use crate::pipeline::FloodPipeline;

/// Default `days` for history queries.
pub const DEFAULT_HISTORY_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Status code plus JSON body, independent of the HTTP server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Latest-reading view; values rounded to two decimals.
fn raw_json(reading: &SensorReading) -> Value {
    json!({
        "datetime": reading.timestamp,
        "temperature": round2(reading.temperature),
        "relative_humidity": round2(reading.humidity),
        "rain": round2(reading.rain),
        "surface_pressure": round2(reading.pressure),
        "soil_moisture": round2(reading.soil_moisture),
        "last_updated": format_epoch(reading.timestamp),
    })
}

fn history_json(reading: &SensorReading) -> Value {
    json!({
        "datetime": reading.timestamp,
        "timestamp": format_epoch(reading.timestamp),
        "temperature": reading.temperature,
        "relative_humidity": reading.humidity,
        "rain": reading.rain,
        "surface_pressure": reading.pressure,
        "soil_moisture": reading.soil_moisture,
    })
}

fn prediction_json(record: &PredictionRecord) -> Value {
    // level_* duplicates prediction_* for older dashboards
    json!({
        "datetime": record.timestamp,
        "prediction_24": record.risk_24.index(),
        "prediction_48": record.risk_48.index(),
        "level_24": record.risk_24.index(),
        "level_48": record.risk_48.index(),
        "last_updated": format_epoch(record.timestamp),
    })
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Checks the `X-API-Key` value against the configured keys.
pub fn is_authorized(config: &EndpointConfig, api_key: Option<&str>) -> bool {
    if !config.require_api_key {
        return true;
    }
    api_key.is_some_and(|key| config.api_keys.iter().any(|k| k == key))
}

/// Last four characters of a key, for logs.
fn key_suffix(api_key: Option<&str>) -> String {
    match api_key {
        Some(key) => {
            let chars: Vec<char> = key.chars().collect();
            chars[chars.len().saturating_sub(4)..].iter().collect()
        }
        None => "None".to_string(),
    }
}

/// Reads `name` from a query string, percent-decoded.
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
}

fn parse_days(query: &str) -> Result<i64, ApiResponse> {
    match query_param(query, "days") {
        None => Ok(DEFAULT_HISTORY_DAYS),
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            ApiResponse::error(400, "Days parameter must be between 1 and 30")
        }),
    }
}

/// Routes one request. `url` may carry a query string.
pub fn route(
    pipeline: &FloodPipeline,
    config: &EndpointConfig,
    method: &Method,
    url: &str,
    api_key: Option<&str>,
    body: &str,
) -> ApiResponse {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    if path == "/api/health" {
        return handle_health();
    }

    let known = matches!(
        path,
        "/api/raw"
            | "/api/prediction"
            | "/api/data/history"
            | "/api/prediction/history"
            | "/api/newdata"
    );
    if !known {
        return ApiResponse::error(404, "Endpoint not found");
    }

    if !is_authorized(config, api_key) {
        warn!(path, api_key = %key_suffix(api_key), "Unauthorized access attempt");
        return ApiResponse::error(401, "Unauthorized: Invalid API key");
    }

    match (method, path) {
        (Method::Get, "/api/raw") => handle_raw(pipeline),
        (Method::Get, "/api/prediction") => handle_prediction(pipeline),
        (Method::Get, "/api/data/history") => match parse_days(query) {
            Ok(days) => handle_history(pipeline, days),
            Err(response) => response,
        },
        (Method::Get, "/api/prediction/history") => match parse_days(query) {
            Ok(days) => handle_prediction_history(pipeline, days),
            Err(response) => response,
        },
        (Method::Post, "/api/newdata") => handle_new_data(pipeline, body),
        _ => ApiResponse::error(405, "Method not allowed"),
    }
}

/// Handle /api/health
fn handle_health() -> ApiResponse {
    let now = chrono::Utc::now();
    ApiResponse::ok(json!({
        "status": "ok",
        "timestamp": now.timestamp_millis() as f64 / 1000.0,
    }))
}

fn lookup_failure(err: LookupError) -> ApiResponse {
    match err {
        LookupError::NotFound(e) => ApiResponse::error(404, e.to_string()),
        LookupError::Store(e) => ApiResponse::error(500, e.to_string()),
    }
}

fn history_failure(err: HistoryError) -> ApiResponse {
    match err {
        HistoryError::InvalidDays(_) => {
            ApiResponse::error(400, "Days parameter must be between 1 and 30")
        }
        HistoryError::Store(e) => ApiResponse::error(500, e.to_string()),
    }
}

/// Handle /api/raw
fn handle_raw(pipeline: &FloodPipeline) -> ApiResponse {
    match pipeline.latest_reading() {
        Ok(reading) => ApiResponse::ok(raw_json(&reading)),
        Err(e) => lookup_failure(e),
    }
}

/// Handle /api/prediction
fn handle_prediction(pipeline: &FloodPipeline) -> ApiResponse {
    match pipeline.latest_prediction() {
        Ok(record) => ApiResponse::ok(prediction_json(&record)),
        Err(e) => lookup_failure(e),
    }
}

/// Handle /api/data/history
fn handle_history(pipeline: &FloodPipeline, days: i64) -> ApiResponse {
    match pipeline.history(days) {
        Ok(rows) if rows.is_empty() => ApiResponse::error(404, "No historical data available"),
        Ok(rows) => ApiResponse::ok(json!({
            "history": rows.iter().map(history_json).collect::<Vec<_>>()
        })),
        Err(e) => history_failure(e),
    }
}

/// Handle /api/prediction/history
fn handle_prediction_history(pipeline: &FloodPipeline, days: i64) -> ApiResponse {
    match pipeline.prediction_history(days) {
        Ok(rows) if rows.is_empty() => ApiResponse::error(404, "No prediction data available"),
        Ok(rows) => ApiResponse::ok(json!({
            "history": rows.iter().map(prediction_json).collect::<Vec<_>>()
        })),
        Err(e) => history_failure(e),
    }
}

/// Handle /api/newdata
fn handle_new_data(pipeline: &FloodPipeline, body: &str) -> ApiResponse {
    let payload: Value = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(_) => return ApiResponse::error(400, "Request body must be a JSON object"),
    };

    match pipeline.submit_reading(&payload) {
        Ok(outcome) => {
            let (prediction, prediction_error) = match &outcome.prediction {
                Ok(result) => (json!(result.report()), Value::Null),
                Err(e) => (Value::Null, json!(e.to_string())),
            };
            let warnings: Vec<Value> = outcome
                .warnings
                .iter()
                .map(|w| json!({ "field": w.field, "value": w.value, "min": w.min, "max": w.max }))
                .collect();

            ApiResponse::ok(json!({
                "status": "Data updated successfully",
                "accepted": true,
                "timestamp": outcome.reading.timestamp,
                "prediction": prediction,
                "prediction_error": prediction_error,
                "warnings": warnings,
            }))
        }
        Err(SubmitError::Validation(e)) => ApiResponse::error(400, e.to_string()),
        Err(SubmitError::Store(e)) => ApiResponse::error(500, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on `config.port`. Blocks serving requests.
pub fn start_endpoint_server(
    pipeline: Arc<FloodPipeline>,
    config: EndpointConfig,
) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", config.port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    let telemetry = pipeline.telemetry().clone();
    telemetry.scope(|| {
        info!(
            port = config.port,
            require_api_key = config.require_api_key,
            "HTTP endpoint listening on http://0.0.0.0:{}",
            config.port
        );

        for mut request in server.incoming_requests() {
            let method = request.method().clone();
            let url = request.url().to_string();
            let api_key = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("X-API-Key"))
                .map(|h| h.value.as_str().to_string());

            info!(
                method = %method,
                path = url.split('?').next().unwrap_or(""),
                remote_addr = ?request.remote_addr(),
                api_key = %key_suffix(api_key.as_deref()),
                "Request"
            );

            let mut body = String::new();
            let response = match request.as_reader().read_to_string(&mut body) {
                Ok(_) => route(&pipeline, &config, &method, &url, api_key.as_deref(), &body),
                Err(e) => ApiResponse::error(400, format!("Failed to read request body: {}", e)),
            };

            let status = response.status;
            let http_response = create_response(response.status, response.body);
            info!(status, content_length = ?http_response.data_length(), "Response");

            if let Err(e) = request.respond(http_response) {
                error!(error = %e, "Failed to send response");
            }
        }
    });

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let body = format!("{:#}", json);
    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PipelineConfig;
    use crate::error::InferenceError;
    use crate::inference::classifier::Classifier;
    use crate::inference::orchestrator::ModelBundle;
    use crate::inference::scaler::{InputTensor, ScalerModel};
    use crate::store::{MemoryStore, OP_APPEND_READING};
    use crate::telemetry::Telemetry;

    struct Constant(Vec<f64>);

    impl Classifier for Constant {
        fn predict(&self, _input: &InputTensor) -> Result<Vec<f64>, InferenceError> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &str {
            "constant"
        }
        fn version(&self) -> &str {
            "test"
        }
    }

    fn pipeline(store: &MemoryStore) -> FloodPipeline {
        let bundle = ModelBundle::new(
            ScalerModel::standard("t", [0.0; 5], [1.0; 5]).unwrap(),
            Arc::new(Constant(vec![0.5, 0.3, 0.2])),
            Arc::new(Constant(vec![0.2, 0.5, 0.3])),
        );
        FloodPipeline::new(
            Arc::new(bundle),
            Arc::new(store.clone()),
            Arc::new(ManualClock::ticking(1_700_000_000, 1)),
            PipelineConfig::default(),
            Telemetry::silent(),
        )
    }

    fn config() -> EndpointConfig {
        EndpointConfig {
            port: 0,
            api_keys: vec!["a1b2c3d4e5f6g7h8i9j0".to_string()],
            require_api_key: true,
        }
    }

    const KEY: Option<&str> = Some("a1b2c3d4e5f6g7h8i9j0");

    const READING: &str = r#"{
        "temperature": 25.8,
        "humidity": 80.5,
        "rain": 10.2,
        "pressure": 1010.5,
        "soil_moisture": 0.75
    }"#;

    #[test]
    fn test_health_needs_no_key() {
        let store = MemoryStore::new();
        let response = route(&pipeline(&store), &config(), &Method::Get, "/api/health", None, "");
        assert_eq!(response.status, 200);
        assert_eq!(response.body["status"], "ok");
    }

    #[test]
    fn test_missing_or_wrong_key_is_unauthorized() {
        let store = MemoryStore::new();
        let p = pipeline(&store);
        assert_eq!(route(&p, &config(), &Method::Get, "/api/raw", None, "").status, 401);
        assert_eq!(route(&p, &config(), &Method::Get, "/api/raw", Some("nope"), "").status, 401);
    }

    #[test]
    fn test_key_check_can_be_disabled() {
        let store = MemoryStore::new();
        let mut cfg = config();
        cfg.require_api_key = false;
        let response = route(&pipeline(&store), &cfg, &Method::Get, "/api/raw", None, "");
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"], "No data available");
    }

    #[test]
    fn test_unknown_route() {
        let store = MemoryStore::new();
        let response = route(&pipeline(&store), &config(), &Method::Get, "/api/nothing", KEY, "");
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"], "Endpoint not found");
    }

    #[test]
    fn test_wrong_method() {
        let store = MemoryStore::new();
        let response = route(&pipeline(&store), &config(), &Method::Get, "/api/newdata", KEY, "");
        assert_eq!(response.status, 405);
    }

    #[test]
    fn test_new_data_then_latest_views() {
        let store = MemoryStore::new();
        let p = pipeline(&store);

        let posted = route(&p, &config(), &Method::Post, "/api/newdata", KEY, READING);
        assert_eq!(posted.status, 200);
        assert_eq!(posted.body["status"], "Data updated successfully");
        assert_eq!(posted.body["accepted"], true);
        assert_eq!(posted.body["prediction"]["24h_risk"], 0);
        assert_eq!(posted.body["prediction"]["48h_risk"], 1);
        assert!(posted.body["prediction_error"].is_null());

        let raw = route(&p, &config(), &Method::Get, "/api/raw", KEY, "");
        assert_eq!(raw.status, 200);
        assert_eq!(raw.body["temperature"], 25.8);
        assert_eq!(raw.body["relative_humidity"], 80.5);
        assert_eq!(raw.body["surface_pressure"], 1010.5);

        let prediction = route(&p, &config(), &Method::Get, "/api/prediction", KEY, "");
        assert_eq!(prediction.status, 200);
        assert_eq!(prediction.body["prediction_24"], 0);
        assert_eq!(prediction.body["level_48"], 1);
    }

    fn post(pipeline: &FloodPipeline, body: &str) -> ApiResponse {
        route(pipeline, &config(), &Method::Post, "/api/newdata", KEY, body)
    }

    #[test]
    fn test_new_data_validation_error_names_field() {
        let store = MemoryStore::new();
        let body = r#"{"temperature": 25.8, "rain": 10.2, "pressure": 1010.5,
            "soil_moisture": 0.75}"#;
        let response = post(&pipeline(&store), body);
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"], "Missing required field: humidity");
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_new_data_rejects_non_json_body() {
        let store = MemoryStore::new();
        let response = post(&pipeline(&store), "temp=3");
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_new_data_store_failure_is_server_error() {
        let store = MemoryStore::new();
        store.fail_operation(OP_APPEND_READING);
        let response = post(&pipeline(&store), READING);
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_history_days_parameter() {
        let store = MemoryStore::new();
        let p = pipeline(&store);
        route(&p, &config(), &Method::Post, "/api/newdata", KEY, READING);

        let ok = route(&p, &config(), &Method::Get, "/api/data/history?days=1", KEY, "");
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body["history"].as_array().unwrap().len(), 1);

        let default = route(&p, &config(), &Method::Get, "/api/data/history", KEY, "");
        assert_eq!(default.status, 200);

        for bad in ["0", "31", "-2", "seven"] {
            let url = format!("/api/data/history?days={}", bad);
            let response = route(&p, &config(), &Method::Get, &url, KEY, "");
            assert_eq!(response.status, 400, "days={}", bad);
        }

        let url = "/api/prediction/history?days=2";
        let predictions = route(&p, &config(), &Method::Get, url, KEY, "");
        assert_eq!(predictions.status, 200);
        assert_eq!(predictions.body["history"][0]["prediction_48"], 1);
    }

    #[test]
    fn test_empty_history_is_not_found() {
        let store = MemoryStore::new();
        let url = "/api/data/history?days=3";
        let response = route(&pipeline(&store), &config(), &Method::Get, url, KEY, "");
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_key_suffix() {
        assert_eq!(key_suffix(Some("a1b2c3d4e5f6g7h8i9j0")), "i9j0");
        assert_eq!(key_suffix(Some("ab")), "ab");
        assert_eq!(key_suffix(None), "None");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1010.456), 1010.46);
        assert_eq!(round2(0.754), 0.75);
    }
}
