//! Canonical telemetry shapes and the wire formats of the greenhouse backend.
//!
//! Backend variants disagree on field names (`temperatura` vs `temperature`,
//! `time` vs `timestamp`). Everything is normalized here, at the ingestion
//! boundary, into [`TelemetryPoint`]; anything unrecognized is rejected as a
//! data-shape failure instead of being coerced.

use crate::error::BackendError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const TIMESTAMP_KEYS: [&str; 2] = ["timestamp", "time"];
const TEMPERATURE_KEYS: [&str; 2] = ["temperatura", "temperature"];
const HUMIDITY_KEYS: [&str; 2] = ["umidade", "humidity"];
const LIGHT_KEYS: [&str; 2] = ["luminosidade", "light"];
const WATER_KEYS: [&str; 3] = ["nivel_reservatorio", "water_level", "waterLevel"];

/// One timestamped sensor reading. Measurements are `None` when the source
/// omitted them or sent something non-numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<f64>,
    pub water_level: Option<f64>,
}

impl TelemetryPoint {
    pub fn new(timestamp: DateTime<Utc>, temperature: f64, humidity: f64) -> Self {
        Self {
            timestamp,
            temperature: Some(temperature),
            humidity: Some(humidity),
            light: None,
            water_level: None,
        }
    }

    /// Normalize one element of a `/dados` response.
    pub fn from_json(value: &Value) -> Result<Self, BackendError> {
        let obj = value.as_object().ok_or_else(|| {
            BackendError::shape(format!("expected telemetry object, got {}", type_name(value)))
        })?;

        let raw_ts = lookup(obj, &TIMESTAMP_KEYS)
            .ok_or_else(|| BackendError::shape("telemetry point without timestamp"))?;
        let timestamp = parse_timestamp(raw_ts)
            .ok_or_else(|| BackendError::shape(format!("unparseable timestamp {}", raw_ts)))?;

        let known = [&TEMPERATURE_KEYS[..], &HUMIDITY_KEYS[..], &LIGHT_KEYS[..], &WATER_KEYS[..]]
            .iter()
            .any(|keys| lookup(obj, keys).is_some());
        if !known {
            return Err(BackendError::shape("telemetry point carries no known measurement"));
        }

        Ok(Self {
            timestamp,
            temperature: lookup(obj, &TEMPERATURE_KEYS).and_then(numeric),
            humidity: lookup(obj, &HUMIDITY_KEYS).and_then(numeric),
            light: lookup(obj, &LIGHT_KEYS).and_then(numeric),
            water_level: lookup(obj, &WATER_KEYS).and_then(numeric),
        })
    }
}

/// Points returned by one fetch, in the order the source sent them.
pub type TelemetryBatch = Vec<TelemetryPoint>;

/// Normalize a full `/dados` body. A non-array body, or any element that
/// cannot be normalized, fails the whole batch.
pub fn parse_batch(value: &Value) -> Result<TelemetryBatch, BackendError> {
    let items = value.as_array().ok_or_else(|| {
        BackendError::shape(format!("expected telemetry array, got {}", type_name(value)))
    })?;
    items.iter().map(TelemetryPoint::from_json).collect()
}

/// `/series` body: parallel arrays indexed by sample.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesResponse {
    pub time: Vec<Value>,
    #[serde(alias = "temperature")]
    pub temperatura: Vec<Value>,
    #[serde(alias = "humidity")]
    pub umidade: Vec<Value>,
}

impl SeriesResponse {
    pub fn into_batch(self) -> Result<TelemetryBatch, BackendError> {
        let n = self.time.len();
        if self.temperatura.len() != n || self.umidade.len() != n {
            return Err(BackendError::shape(format!(
                "series arrays differ in length (time={}, temperatura={}, umidade={})",
                n,
                self.temperatura.len(),
                self.umidade.len()
            )));
        }

        self.time
            .iter()
            .zip(self.temperatura.iter().zip(self.umidade.iter()))
            .map(|(t, (temp, hum))| {
                let timestamp = parse_timestamp(t)
                    .ok_or_else(|| BackendError::shape(format!("unparseable timestamp {}", t)))?;
                Ok(TelemetryPoint {
                    timestamp,
                    temperature: numeric(temp),
                    humidity: numeric(hum),
                    light: None,
                    water_level: None,
                })
            })
            .collect()
    }
}

/// Per-quantity statistics as computed by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantityStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub media: Option<f64>,
}

/// `/analise` body. An empty history comes back as `{"erro": "..."}`, which
/// leaves every statistic unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub temperatura: Option<QuantityStats>,
    #[serde(default)]
    pub umidade: Option<QuantityStats>,
    #[serde(default)]
    pub spikes_temp_idx: Vec<usize>,
    #[serde(default)]
    pub spikes_umi_idx: Vec<usize>,
    #[serde(default)]
    pub erro: Option<String>,
}

impl AnalysisReport {
    pub fn mean_temperature(&self) -> Option<f64> {
        self.temperatura.as_ref().and_then(|s| s.media)
    }

    pub fn mean_humidity(&self) -> Option<f64> {
        self.umidade.as_ref().and_then(|s| s.media)
    }
}

/// `/chat` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub mensagem: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
}

/// `/chat` response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub resposta: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tem_relatorio: Option<bool>,
    #[serde(default)]
    pub url_download: Option<String>,
}

/// Download affordance attached to a single bot message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub download_url: String,
    pub available: bool,
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

/// Finite JSON numbers only. Strings, booleans and nulls count as missing.
fn numeric(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// RFC 3339, naive ISO 8601 (taken as UTC) or epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    #[test]
    fn test_portuguese_fields_normalize() {
        let batch = parse_batch(&json!([
            {"time": "2025-03-01T10:00:00Z", "temperatura": 21.5, "umidade": 60.0,
             "luminosidade": 830, "nivel_reservatorio": 0.75}
        ]))
        .unwrap();
        let p = &batch[0];
        assert_eq!(p.timestamp, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(p.temperature, Some(21.5));
        assert_eq!(p.humidity, Some(60.0));
        assert_eq!(p.light, Some(830.0));
        assert_eq!(p.water_level, Some(0.75));
    }

    #[test]
    fn test_english_fields_and_naive_timestamp() {
        let p = TelemetryPoint::from_json(&json!(
            {"timestamp": "2025-03-01T10:00:00", "temperature": 19.0, "humidity": 55}
        ))
        .unwrap();
        assert_eq!(p.timestamp, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(p.humidity, Some(55.0));
        assert_eq!(p.light, None);
    }

    #[test]
    fn test_non_numeric_measurement_is_missing() {
        let p = TelemetryPoint::from_json(&json!(
            {"timestamp": 1_740_823_200, "temperatura": "n/a", "umidade": null}
        ))
        .unwrap();
        assert_eq!(p.temperature, None);
        assert_eq!(p.humidity, None);
    }

    #[test]
    fn test_unrecognized_shapes_rejected() {
        let not_array = parse_batch(&json!({"temperatura": 20})).unwrap_err();
        assert_eq!(not_array.kind(), FailureKind::DataShape);

        let no_ts = parse_batch(&json!([{"temperatura": 20}])).unwrap_err();
        assert_eq!(no_ts.kind(), FailureKind::DataShape);

        let no_fields =
            parse_batch(&json!([{"time": "2025-03-01T10:00:00Z", "foo": 1}])).unwrap_err();
        assert_eq!(no_fields.kind(), FailureKind::DataShape);
    }

    #[test]
    fn test_series_zip_and_length_mismatch() {
        let ok: SeriesResponse = serde_json::from_value(json!({
            "time": ["2025-03-01T10:00:00Z", "2025-03-01T10:05:00Z"],
            "temperatura": [20.0, 22.0],
            "umidade": [50.0, null]
        }))
        .unwrap();
        let batch = ok.into_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].humidity, None);

        let bad: SeriesResponse = serde_json::from_value(json!({
            "time": ["2025-03-01T10:00:00Z"],
            "temperatura": [20.0, 22.0],
            "umidade": [50.0]
        }))
        .unwrap();
        assert_eq!(bad.into_batch().unwrap_err().kind(), FailureKind::DataShape);
    }

    #[test]
    fn test_analysis_empty_history() {
        let report: AnalysisReport = serde_json::from_value(json!({"erro": "sem dados"})).unwrap();
        assert_eq!(report.mean_temperature(), None);
        assert_eq!(report.erro.as_deref(), Some("sem dados"));
    }

    #[test]
    fn test_chat_request_omits_absent_session() {
        let request = ChatRequest { mensagem: "oi".into(), session_id: None };
        let body = serde_json::to_value(request).unwrap();
        assert_eq!(body, json!({"mensagem": "oi"}));
    }
}
