//! Data types flowing through the metrics pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One raw position+speed reading from a tracked device.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sample {
    pub latitude: f64,
    pub longitude: f64,
    /// km/h, `0` means the device was stationary
    pub speed: f64,
    #[serde(deserialize_with = "deserialize_datetime")]
    pub datetime: DateTime<Utc>,
}

impl Sample {
    pub fn new(latitude: f64, longitude: f64, speed: f64, datetime: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            datetime,
        }
    }
}

/// Most recent known fix of a device, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LatestPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub datetime: String,
}

/// Travel summary for one device over a period.
///
/// Distances are meters and `down_time_probability` is a fraction in `[0, 1]`.
/// Fields stay `f64` so malformed input shows up as NaN instead of a panic.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub metros_percorridos: f64,
    pub media_metros_dia: f64,
    pub media_velocidade: f64,
    pub down_time_probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_position: Option<LatestPosition>,
}

impl DashboardMetrics {
    /// Attach the latest known position supplied by the data source
    pub fn with_latest_position(mut self, position: Option<LatestPosition>) -> Self {
        self.latest_position = position;
        self
    }
}

/// Parses RFC 3339 timestamps, falling back to naive ISO-8601 read as UTC.
pub fn parse_datetime(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(anyhow::anyhow!("Unrecognized datetime `{}`", raw))
}

fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_datetime(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_datetime_rfc3339() {
        let dt = parse_datetime("2024-05-01T23:30:00-03:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 5, 2, 2, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_naive_is_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-05-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024-05-01 12:00:00.000").unwrap(), expected);
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_metrics_serialize_wire_names() {
        let metrics = DashboardMetrics {
            metros_percorridos: 10.0,
            ..Default::default()
        };
        let json = serde_json::to_value(&metrics).unwrap();

        assert_eq!(json["metrosPercorridos"], 10.0);
        assert_eq!(json["downTimeProbability"], 0.0);
        assert!(json.get("latestPosition").is_none());
    }
}
