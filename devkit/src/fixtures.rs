/*!
Fixture builders for telemetry batches and assistant replies

- Batches of evenly spaced points with chosen temperatures
- The backend's Portuguese wire format for `/dados` and `/series`
- Assistant replies with or without session/report fields
*/

use chrono::{DateTime, Duration, TimeZone, Utc};
use estufa_dashboard::models::ChatReply;
use estufa_dashboard::{TelemetryBatch, TelemetryPoint};
use serde_json::{json, Value};

/// Fixed reference instant so labels and ordering are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

/// Builds a batch in ascending time order, one point per step.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    start: DateTime<Utc>,
    step: Duration,
    points: Vec<TelemetryPoint>,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self { start: base_time(), step: Duration::minutes(5), points: Vec::new() }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn every(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        self.start + self.step * self.points.len() as i32
    }

    /// One point per temperature, humidity fixed at 50%.
    pub fn temps(self, temps: &[f64]) -> Self {
        temps.iter().fold(self, |b, t| b.reading(*t, 50.0))
    }

    pub fn reading(mut self, temperature: f64, humidity: f64) -> Self {
        let point = TelemetryPoint::new(self.next_timestamp(), temperature, humidity);
        self.points.push(point);
        self
    }

    /// Point with every measurement, light and water level included.
    pub fn full(mut self, temperature: f64, humidity: f64, light: f64, water_level: f64) -> Self {
        let point = TelemetryPoint {
            timestamp: self.next_timestamp(),
            temperature: Some(temperature),
            humidity: Some(humidity),
            light: Some(light),
            water_level: Some(water_level),
        };
        self.points.push(point);
        self
    }

    /// Point whose temperature and humidity are missing.
    pub fn gap(mut self) -> Self {
        let point = TelemetryPoint {
            timestamp: self.next_timestamp(),
            temperature: None,
            humidity: None,
            light: Some(0.0),
            water_level: None,
        };
        self.points.push(point);
        self
    }

    pub fn build(self) -> TelemetryBatch {
        self.points
    }
}

impl Default for BatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `/dados` body for a batch, newest first as the backend sends it.
pub fn dados_json(batch: &[TelemetryPoint]) -> Value {
    Value::Array(batch.iter().rev().map(point_json).collect())
}

/// `/series` body: parallel arrays in ascending order.
pub fn series_json(batch: &[TelemetryPoint]) -> Value {
    json!({
        "time": batch.iter().map(|p| p.timestamp.to_rfc3339()).collect::<Vec<_>>(),
        "temperatura": batch.iter().map(|p| p.temperature).collect::<Vec<_>>(),
        "umidade": batch.iter().map(|p| p.humidity).collect::<Vec<_>>(),
    })
}

pub fn point_json(point: &TelemetryPoint) -> Value {
    json!({
        "timestamp": point.timestamp.to_rfc3339(),
        "temperatura": point.temperature,
        "umidade": point.humidity,
        "luminosidade": point.light,
        "nivel_reservatorio": point.water_level,
    })
}

/// Builds assistant replies.
#[derive(Debug, Clone, Default)]
pub struct ReplyBuilder {
    reply: ChatReply,
}

impl ReplyBuilder {
    pub fn text(resposta: &str) -> Self {
        Self { reply: ChatReply { resposta: Some(resposta.to_string()), ..Default::default() } }
    }

    pub fn session(mut self, id: &str) -> Self {
        self.reply.session_id = Some(id.to_string());
        self
    }

    pub fn report(mut self, url: &str) -> Self {
        self.reply.tem_relatorio = Some(true);
        self.reply.url_download = Some(url.to_string());
        self
    }

    pub fn build(self) -> ChatReply {
        self.reply
    }
}
