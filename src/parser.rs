//! Decoding of position samples and backend stats payloads.

use anyhow::{Context, Result, anyhow};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

use crate::metrics::{DashboardMetrics, LatestPosition, MetricsSource, Sample};

/// Summary as aggregated by the backend. Distances in km, downtime in percent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSummary {
    #[serde(deserialize_with = "null_as_zero")]
    pub total_distance: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub average_distance_per_day: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub average_speed: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub downtime_probability: f64,
    pub result_position: Option<LatestPosition>,
}

/// Keys that mark an object as a backend summary.
const SUMMARY_FIELDS: &[&str] = &[
    "totalDistance",
    "averageDistancePerDay",
    "averageSpeed",
    "downtimeProbability",
    "resultPosition",
];

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl From<BackendSummary> for DashboardMetrics {
    fn from(summary: BackendSummary) -> Self {
        DashboardMetrics {
            metros_percorridos: summary.total_distance * 1000.0,
            media_metros_dia: summary.average_distance_per_day * 1000.0,
            media_velocidade: summary.average_speed,
            down_time_probability: summary.downtime_probability / 100.0,
            latest_position: None,
        }
        .with_latest_position(summary.result_position)
    }
}

/// Decodes a JSON array of samples.
pub fn parse_samples_json(bytes: &[u8]) -> Result<Vec<Sample>> {
    serde_json::from_slice(bytes).context("Failed to parse samples JSON")
}

/// Decodes samples from CSV with a `latitude,longitude,speed,datetime` header.
pub fn parse_samples_csv<R: Read>(reader: R) -> Result<Vec<Sample>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut samples = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let sample: Sample =
            result.with_context(|| format!("Invalid sample at row {}", line + 1))?;
        samples.push(sample);
    }

    Ok(samples)
}

/// Decodes a `/api/deviceStats` body.
///
/// An array is a list of raw samples; an object carrying summary fields is a
/// backend summary, converted to meters and a 0-1 downtime fraction.
pub fn parse_device_stats(bytes: &[u8]) -> Result<MetricsSource> {
    let body: Value = serde_json::from_slice(bytes).context("Failed to parse device stats")?;

    match body {
        Value::Array(items) => {
            let samples = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value::<Sample>(item)
                        .with_context(|| format!("Invalid sample at index {i}"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(MetricsSource::RawSamples(samples))
        }
        Value::Object(fields) => {
            if !SUMMARY_FIELDS.iter().any(|k| fields.contains_key(*k)) {
                let message = fields.get("message").and_then(Value::as_str);
                return Err(match message {
                    Some(message) => anyhow!("Device stats returned a message: {message}"),
                    None => anyhow!("Device stats object has no summary fields"),
                });
            }
            let summary: BackendSummary = serde_json::from_value(Value::Object(fields))
                .context("Invalid device stats summary")?;
            Ok(MetricsSource::PrecomputedSummary(summary.into()))
        }
        _ => Err(anyhow!("Device stats must be an array or an object")),
    }
}

/// Loads samples from a `.json` file, or from CSV for any other extension.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        parse_samples_json(&bytes)
    } else {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        parse_samples_csv(file)
    }
}
