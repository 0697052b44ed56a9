//! Reading validator: payload → `SensorReading`.
//!
//! All five fields must be present and coercible to a finite number.
//! JSON numbers and numeric strings (`"25.8"`) both coerce. Values outside
//! the expected physical range are logged and kept; range checks never
//! reject input.

use serde_json::Value;
use tracing::warn;

use crate::error::ValidationError;
use crate::model::{FEATURE_COUNT, FEATURE_NAMES, SensorReading};

/// Expected physical range per field, in `FEATURE_NAMES` order.
pub const PHYSICAL_RANGES: [(&str, f64, f64); FEATURE_COUNT] = [
    ("temperature", -40.0, 60.0),
    ("humidity", 0.0, 100.0),
    ("rain", 0.0, 2000.0),
    ("pressure", 800.0, 1200.0),
    ("soil_moisture", 0.0, 100.0),
];

/// A value outside its expected physical range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeWarning {
    pub field: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReading {
    pub reading: SensorReading,
    pub warnings: Vec<RangeWarning>,
}

/// Validates a raw payload and stamps it with `timestamp`.
///
/// Fields are checked in `FEATURE_NAMES` order, so the first missing or
/// non-numeric field is the one reported.
pub fn validate_payload(
    payload: &Value,
    timestamp: i64,
) -> Result<ValidatedReading, ValidationError> {
    let object = payload.as_object().ok_or(ValidationError::NotAnObject)?;

    let mut values = [0.0_f64; FEATURE_COUNT];
    for (slot, field) in values.iter_mut().zip(FEATURE_NAMES) {
        let raw = object
            .get(field)
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
        *slot = coerce(field, raw)?;
    }

    let [temperature, humidity, rain, pressure, soil_moisture] = values;
    let reading = SensorReading {
        timestamp,
        temperature,
        humidity,
        rain,
        pressure,
        soil_moisture,
    };

    let warnings = check_ranges(&reading);
    for w in &warnings {
        warn!(
            field = w.field,
            value = w.value,
            min = w.min,
            max = w.max,
            "Unusual value for {}",
            w.field
        );
    }

    Ok(ValidatedReading { reading, warnings })
}

fn coerce(field: &str, value: &Value) -> Result<f64, ValidationError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(ValidationError::NotNumeric {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Soft range check. Returns one warning per out-of-range field.
pub fn check_ranges(reading: &SensorReading) -> Vec<RangeWarning> {
    reading
        .features()
        .into_iter()
        .zip(PHYSICAL_RANGES)
        .filter(|(value, (_, min, max))| value < min || value > max)
        .map(|(value, (field, min, max))| RangeWarning { field, value, min, max })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "temperature": 25.8,
            "humidity": 80.5,
            "rain": 10.2,
            "pressure": 1010.5,
            "soil_moisture": 0.75
        })
    }

    #[test]
    fn test_valid_payload_accepted_without_warnings() {
        let validated = validate_payload(&sample(), 1_700_000_000).unwrap();
        assert_eq!(validated.reading.timestamp, 1_700_000_000);
        assert_eq!(validated.reading.temperature, 25.8);
        assert_eq!(validated.reading.soil_moisture, 0.75);
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let payload = json!({
            "temperature": "25.8",
            "humidity": " 80 ",
            "rain": 0,
            "pressure": "1e3",
            "soil_moisture": "0.75"
        });
        let reading = validate_payload(&payload, 0).unwrap().reading;
        assert_eq!(reading.humidity, 80.0);
        assert_eq!(reading.rain, 0.0);
        assert_eq!(reading.pressure, 1000.0);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let mut payload = sample();
        payload["station"] = json!("north-field");
        assert!(validate_payload(&payload, 0).is_ok());
    }

    #[rstest]
    #[case("temperature")]
    #[case("humidity")]
    #[case("rain")]
    #[case("pressure")]
    #[case("soil_moisture")]
    fn test_missing_field_is_named(#[case] field: &str) {
        let mut payload = sample();
        payload.as_object_mut().unwrap().remove(field);
        let err = validate_payload(&payload, 0).unwrap_err();
        assert_eq!(err, ValidationError::MissingField(field.to_string()));
    }

    #[rstest]
    #[case(json!("wet"))]
    #[case(json!(null))]
    #[case(json!(true))]
    #[case(json!([1.0]))]
    #[case(json!("NaN"))]
    #[case(json!("inf"))]
    fn test_non_numeric_value_rejected(#[case] value: Value) {
        let mut payload = sample();
        payload["rain"] = value;
        let err = validate_payload(&payload, 0).unwrap_err();
        assert_eq!(err.field(), Some("rain"));
        assert!(matches!(err, ValidationError::NotNumeric { .. }));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert_eq!(validate_payload(&json!([1, 2]), 0).unwrap_err(), ValidationError::NotAnObject);
    }

    #[test]
    fn test_out_of_range_is_warning_not_error() {
        let mut payload = sample();
        payload["temperature"] = json!(75.0);
        payload["pressure"] = json!(640.0);

        let validated = validate_payload(&payload, 0).unwrap();
        assert_eq!(validated.reading.temperature, 75.0, "value must pass through unmodified");
        let fields: Vec<_> = validated.warnings.iter().map(|w| w.field).collect();
        assert_eq!(fields, vec!["temperature", "pressure"]);
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let reading = SensorReading {
            timestamp: 0,
            temperature: -40.0,
            humidity: 100.0,
            rain: 2000.0,
            pressure: 800.0,
            soil_moisture: 0.0,
        };
        assert!(check_ranges(&reading).is_empty());
    }

    proptest! {
        #[test]
        fn prop_any_finite_numbers_accepted(
            values in proptest::array::uniform5(-1.0e6f64..1.0e6),
            as_string in proptest::array::uniform5(any::<bool>()),
        ) {
            let mut object = serde_json::Map::new();
            for ((field, value), stringify) in FEATURE_NAMES.iter().zip(values).zip(as_string) {
                let v = if stringify { json!(value.to_string()) } else { json!(value) };
                object.insert(field.to_string(), v);
            }

            let reading = validate_payload(&Value::Object(object), 7).unwrap().reading;
            prop_assert_eq!(reading.features(), values);
        }

        #[test]
        fn prop_missing_any_one_field_names_it(idx in 0usize..FEATURE_COUNT) {
            let mut payload = sample();
            payload.as_object_mut().unwrap().remove(FEATURE_NAMES[idx]);
            let err = validate_payload(&payload, 0).unwrap_err();
            prop_assert_eq!(err.field(), Some(FEATURE_NAMES[idx]));
        }
    }
}
