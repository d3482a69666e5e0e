//! Batch statistics and trend classification.
//!
//! Both functions are pure: the same batch always yields the same snapshot,
//! and trends depend only on the two snapshots handed in.

use crate::models::TelemetryPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Changes smaller than this (absolute units) are reported as stable.
pub const TREND_DEAD_BAND: f64 = 0.1;

/// Summary of one batch. Superseded on every successful poll, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub mean_temperature: f64,
    pub mean_humidity: f64,
    pub mean_light: f64,
    pub mean_water_level: f64,
    /// Points with a numeric temperature.
    pub sample_count: usize,
    pub humidity_count: usize,
    pub light_count: usize,
    pub water_level_count: usize,
    /// Data time of the newest point in the batch.
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Temperature,
    Humidity,
    Light,
    WaterLevel,
}

impl Quantity {
    pub const ALL: [Quantity; 4] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Light,
        Quantity::WaterLevel,
    ];
}

impl AggregateSnapshot {
    pub fn mean(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Temperature => self.mean_temperature,
            Quantity::Humidity => self.mean_humidity,
            Quantity::Light => self.mean_light,
            Quantity::WaterLevel => self.mean_water_level,
        }
    }

    /// Points that actually carried `quantity`.
    pub fn count(&self, quantity: Quantity) -> usize {
        match quantity {
            Quantity::Temperature => self.sample_count,
            Quantity::Humidity => self.humidity_count,
            Quantity::Light => self.light_count,
            Quantity::WaterLevel => self.water_level_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

/// Trend of every measured quantity between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trends {
    pub temperature: TrendDirection,
    pub humidity: TrendDirection,
    pub light: TrendDirection,
    pub water_level: TrendDirection,
}

impl Trends {
    pub fn get(&self, quantity: Quantity) -> TrendDirection {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
            Quantity::Light => self.light,
            Quantity::WaterLevel => self.water_level,
        }
    }
}

/// Reduce a batch to its means.
///
/// Temperature and humidity means only count points carrying that
/// measurement. Light and water level treat a missing value as 0 and
/// divide by the batch length.
pub fn summarize(batch: &[TelemetryPoint]) -> AggregateSnapshot {
    let temps: Vec<f64> = batch.iter().filter_map(|p| p.temperature).collect();
    let hums: Vec<f64> = batch.iter().filter_map(|p| p.humidity).collect();

    let light_total: f64 = batch.iter().map(|p| p.light.unwrap_or(0.0)).sum();
    let water_total: f64 = batch.iter().map(|p| p.water_level.unwrap_or(0.0)).sum();

    AggregateSnapshot {
        mean_temperature: mean(&temps),
        mean_humidity: mean(&hums),
        mean_light: ratio(light_total, batch.len()),
        mean_water_level: ratio(water_total, batch.len()),
        sample_count: temps.len(),
        humidity_count: hums.len(),
        light_count: batch.iter().filter(|p| p.light.is_some()).count(),
        water_level_count: batch.iter().filter(|p| p.water_level.is_some()).count(),
        computed_at: batch.iter().map(|p| p.timestamp).max(),
    }
}

/// Compare `current` against the snapshot that immediately preceded it.
pub fn trend(current: &AggregateSnapshot, previous: &AggregateSnapshot) -> Trends {
    let dir = |q: Quantity| classify(current.mean(q) - previous.mean(q));
    Trends {
        temperature: dir(Quantity::Temperature),
        humidity: dir(Quantity::Humidity),
        light: dir(Quantity::Light),
        water_level: dir(Quantity::WaterLevel),
    }
}

pub fn classify(delta: f64) -> TrendDirection {
    if delta.abs() < TREND_DEAD_BAND {
        TrendDirection::Stable
    } else if delta > 0.0 {
        TrendDirection::Rising
    } else {
        TrendDirection::Falling
    }
}

fn mean(values: &[f64]) -> f64 {
    ratio(values.iter().sum(), values.len())
}

fn ratio(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
