use boia_dashboard::metrics::{MetricsSource, aggregate, haversine_distance};
use boia_dashboard::output::{DeviceMetrics, Period, write_export};
use boia_dashboard::parser::{load_samples, parse_device_stats};
use chrono::{TimeZone, Utc};
use std::path::Path;

#[test]
fn test_full_pipeline() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/boia_samples.csv");
    let samples = load_samples(&path).expect("Failed to load samples");
    assert_eq!(samples.len(), 4);

    let metrics = aggregate(&samples);

    // three half-degree hops along the equator; May 1 holds two, May 2 one
    let hop = haversine_distance(0.0, 0.0, 0.0, 0.5);
    assert_eq!(metrics.metros_percorridos, (3.0 * hop).round());
    assert_eq!(metrics.media_metros_dia, (3.0 * hop / 2.0).round());
    assert_eq!(metrics.media_velocidade, 5.0);
    assert_eq!(metrics.down_time_probability, 0.5);

    let period = Period::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 2, 23, 59, 59).unwrap(),
    );
    let mut csv = Vec::new();
    write_export(
        &mut csv,
        &[DeviceMetrics {
            device_id: "7".to_string(),
            device_name: "Boia Norte".to_string(),
            metrics,
        }],
        &period,
    )
    .unwrap();

    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.lines().nth(1).unwrap().starts_with("7,Boia Norte,"));
    assert!(csv.contains(",50.00,01/05/2024,02/05/2024"));
}

#[test]
fn test_both_stats_shapes_resolve() {
    let raw = br#"[
        {"latitude": 0, "longitude": 0, "speed": 0, "datetime": "2024-05-01T00:00:00Z"},
        {"latitude": 0, "longitude": 1, "speed": 0, "datetime": "2024-05-02T00:00:00Z"}
    ]"#;
    let summary = br#"{"totalDistance": 111.195, "averageDistancePerDay": 111.195, "averageSpeed": 0, "downtimeProbability": 100}"#;

    let from_raw = parse_device_stats(raw).unwrap();
    assert!(matches!(from_raw, MetricsSource::RawSamples(_)));
    let from_raw = from_raw.resolve();

    let from_summary = parse_device_stats(summary).unwrap().resolve();

    assert_eq!(from_raw.metros_percorridos, 111_195.0);
    assert_eq!(from_raw.down_time_probability, 1.0);
    assert!((from_summary.metros_percorridos - 111_195.0).abs() < 1e-6);
    assert_eq!(from_summary.down_time_probability, 1.0);
}
