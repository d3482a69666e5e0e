//! Shapes a fetched batch into what the chart, table and summary cards draw.
//!
//! `apply` never touches the network or timers. Rendering is left to the
//! sinks that receive the resulting [`DashboardView`].

use crate::aggregator::{self, AggregateSnapshot, Quantity, Trends};
use crate::models::{AnalysisReport, TelemetryPoint};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::Serialize;

/// Rendered in place of a missing or non-finite measurement.
pub const PLACEHOLDER: &str = "—";

pub const DEFAULT_CHART_POINTS: usize = 20;

const CHART_LABEL_FORMAT: &str = "%d/%m %H:%M";
const TABLE_TIME_FORMAT: &str = "%d/%m %H:%M:%S";

/// Time zone used for labels. `None` follows the host's local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelClock {
    offset: Option<FixedOffset>,
}

impl LabelClock {
    pub fn local() -> Self {
        Self { offset: None }
    }

    pub fn fixed(offset: FixedOffset) -> Self {
        Self { offset: Some(offset) }
    }

    /// Offset in minutes east of UTC; out-of-range values fall back to local time.
    pub fn from_minutes(minutes: Option<i32>) -> Self {
        Self {
            offset: minutes.and_then(|m| FixedOffset::east_opt(m * 60)),
        }
    }

    fn format(&self, ts: DateTime<Utc>, fmt: &str) -> String {
        match self.offset {
            Some(offset) => ts.with_timezone(&offset).format(fmt).to_string(),
            None => ts.with_timezone(&Local).format(fmt).to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ViewOptions {
    pub chart_points: usize,
    pub clock: LabelClock,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            chart_points: DEFAULT_CHART_POINTS,
            clock: LabelClock::local(),
        }
    }
}

/// Line chart input, oldest sample first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub temperature: Vec<Option<f64>>,
    pub humidity: Vec<Option<f64>>,
}

/// One table row, every cell already formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub time: String,
    pub temperature: String,
    pub humidity: String,
    pub light: String,
    pub water_level: String,
}

/// Summary cards for the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentValues {
    pub temperature: String,
    pub humidity: String,
    pub light: String,
    pub water_level: String,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub chart: ChartSeries,
    pub table: Vec<TableRow>,
    pub current_values: CurrentValues,
    /// `None` until a previous snapshot exists.
    pub trends: Option<Trends>,
    pub snapshot: AggregateSnapshot,
    pub backend_summary: Option<AnalysisReport>,
}

/// Build every view of `batch`, comparing against the snapshot captured
/// before this batch arrived.
pub fn apply(
    batch: &[TelemetryPoint],
    previous: Option<&AggregateSnapshot>,
    opts: &ViewOptions,
) -> DashboardView {
    let snapshot = aggregator::summarize(batch);
    let trends = previous.map(|prev| aggregator::trend(&snapshot, prev));

    DashboardView {
        chart: chart_series(batch, opts),
        table: table_rows(batch, &opts.clock),
        current_values: current_values(&snapshot),
        trends,
        snapshot,
        backend_summary: None,
    }
}

pub fn chart_series(batch: &[TelemetryPoint], opts: &ViewOptions) -> ChartSeries {
    let mut sorted: Vec<&TelemetryPoint> = batch.iter().collect();
    sorted.sort_by_key(|p| p.timestamp);
    let skip = sorted.len().saturating_sub(opts.chart_points);

    let mut chart = ChartSeries::default();
    for p in sorted.into_iter().skip(skip) {
        chart.labels.push(opts.clock.format(p.timestamp, CHART_LABEL_FORMAT));
        chart.timestamps.push(p.timestamp);
        chart.temperature.push(p.temperature.filter(|v| v.is_finite()));
        chart.humidity.push(p.humidity.filter(|v| v.is_finite()));
    }
    chart
}

/// Most recent first.
pub fn table_rows(batch: &[TelemetryPoint], clock: &LabelClock) -> Vec<TableRow> {
    let mut sorted: Vec<&TelemetryPoint> = batch.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    sorted
        .into_iter()
        .map(|p| TableRow {
            time: clock.format(p.timestamp, TABLE_TIME_FORMAT),
            temperature: fmt_fixed(p.temperature, 1),
            humidity: fmt_fixed(p.humidity, 1),
            light: fmt_fixed(p.light, 0),
            water_level: fmt_fixed(p.water_level, 2),
        })
        .collect()
}

fn current_values(snapshot: &AggregateSnapshot) -> CurrentValues {
    // a quantity no point carried has no meaningful mean
    let known = |q: Quantity| (snapshot.count(q) > 0).then(|| snapshot.mean(q));
    CurrentValues {
        temperature: fmt_fixed(known(Quantity::Temperature), 1),
        humidity: fmt_fixed(known(Quantity::Humidity), 1),
        light: fmt_fixed(known(Quantity::Light), 0),
        water_level: fmt_fixed(known(Quantity::WaterLevel), 2),
        sample_count: snapshot.sample_count,
    }
}

pub fn fmt_fixed(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => PLACEHOLDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TrendDirection;
    use chrono::TimeZone;

    fn utc_opts() -> ViewOptions {
        ViewOptions {
            chart_points: DEFAULT_CHART_POINTS,
            clock: LabelClock::fixed(FixedOffset::east_opt(0).unwrap()),
        }
    }

    fn point(min: u32, temp: f64) -> TelemetryPoint {
        TelemetryPoint::new(Utc.with_ymd_and_hms(2025, 3, 1, 10, min, 0).unwrap(), temp, 50.0)
    }

    #[test]
    fn test_table_descending_chart_ascending() {
        let batch = vec![point(5, 21.0), point(10, 22.0), point(0, 20.0)];
        let view = apply(&batch, None, &utc_opts());

        let rows: Vec<&str> = view.table.iter().map(|r| r.time.as_str()).collect();
        assert_eq!(rows, ["01/03 10:10:00", "01/03 10:05:00", "01/03 10:00:00"]);
        assert_eq!(view.chart.labels, ["01/03 10:00", "01/03 10:05", "01/03 10:10"]);
        assert_eq!(view.chart.temperature, [Some(20.0), Some(21.0), Some(22.0)]);
    }

    #[test]
    fn test_chart_truncated_to_most_recent() {
        let batch: Vec<TelemetryPoint> = (0..30).rev().map(|m| point(m, m as f64)).collect();
        let chart = chart_series(&batch, &utc_opts());

        assert_eq!(chart.labels.len(), 20);
        assert_eq!(chart.labels.first().map(String::as_str), Some("01/03 10:10"));
        assert_eq!(chart.labels.last().map(String::as_str), Some("01/03 10:29"));
    }

    #[test]
    fn test_row_precision_and_placeholders() {
        let mut p = point(0, 21.456);
        p.humidity = None;
        p.light = Some(812.6);
        p.water_level = Some(0.5);

        let rows = table_rows(&[p], &utc_opts().clock);
        assert_eq!(rows[0].temperature, "21.5");
        assert_eq!(rows[0].humidity, PLACEHOLDER);
        assert_eq!(rows[0].light, "813");
        assert_eq!(rows[0].water_level, "0.50");
    }

    #[test]
    fn test_cards_follow_their_own_counts() {
        let mut no_humidity = point(0, 21.0);
        no_humidity.humidity = None;
        let cards = apply(&[no_humidity], None, &utc_opts()).current_values;
        assert_eq!(cards.temperature, "21.0");
        assert_eq!(cards.humidity, PLACEHOLDER);
        assert_eq!(cards.light, PLACEHOLDER);
        assert_eq!(cards.water_level, PLACEHOLDER);

        let mut no_temperature = point(0, 0.0);
        no_temperature.temperature = None;
        no_temperature.humidity = Some(64.0);
        no_temperature.light = Some(300.0);
        let cards = apply(&[no_temperature], None, &utc_opts()).current_values;
        assert_eq!(cards.temperature, PLACEHOLDER);
        assert_eq!(cards.humidity, "64.0");
        assert_eq!(cards.light, "300");
        assert_eq!(cards.sample_count, 0);
    }

    #[test]
    fn test_non_finite_never_rendered() {
        assert_eq!(fmt_fixed(Some(f64::NAN), 1), PLACEHOLDER);
        assert_eq!(fmt_fixed(Some(f64::INFINITY), 2), PLACEHOLDER);
    }

    #[test]
    fn test_empty_batch_renders_placeholders() {
        let view = apply(&[], None, &utc_opts());
        assert!(view.table.is_empty());
        assert!(view.chart.labels.is_empty());
        assert_eq!(view.current_values.temperature, PLACEHOLDER);
        assert_eq!(view.current_values.sample_count, 0);
        assert_eq!(view.trends, None);
    }

    #[test]
    fn test_trends_against_previous_snapshot() {
        let first = apply(&[point(0, 20.0), point(5, 22.0)], None, &utc_opts());
        let second = apply(
            &[point(0, 20.0), point(5, 22.0), point(10, 24.0)],
            Some(&first.snapshot),
            &utc_opts(),
        );

        let trends = second.trends.unwrap();
        assert_eq!(trends.temperature, TrendDirection::Rising);
        assert_eq!(trends.humidity, TrendDirection::Stable);
        assert_eq!(second.current_values.temperature, "22.0");
    }

    #[test]
    fn test_label_clock_offset() {
        let clock = LabelClock::from_minutes(Some(-180));
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 2, 30, 0).unwrap();
        assert_eq!(clock.format(ts, CHART_LABEL_FORMAT), "28/02 23:30");
    }
}
