use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::trace;

use crate::metrics::haversine::{haversine_distance, round_to};
use crate::metrics::types::{DashboardMetrics, Sample};

/// Running sums threaded through the pairwise pass.
#[derive(Default)]
struct Totals {
    distance: f64,
    speed: f64,
    daily: BTreeMap<NaiveDate, f64>,
}

/// Aggregates a time-ordered series of [`Sample`]s from one device into
/// [`DashboardMetrics`].
///
/// Distance and speed come from adjacent pairs, so the first sample only
/// contributes its position. Both averages divide by the full sample count.
/// Distances are bucketed by the UTC day of the later sample of each pair and
/// the daily average is taken over the days that were actually observed.
///
/// Samples are not sorted here; out-of-order input gives meaningless numbers.
pub fn aggregate(samples: &[Sample]) -> DashboardMetrics {
    if samples.is_empty() {
        return DashboardMetrics::default();
    }

    let totals = samples
        .windows(2)
        .fold(Totals::default(), |mut totals, pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            let distance =
                haversine_distance(prev.latitude, prev.longitude, curr.latitude, curr.longitude);

            totals.distance += distance;
            totals.speed += curr.speed;
            *totals.daily.entry(curr.datetime.date_naive()).or_default() += distance;

            totals
        });

    let n = samples.len() as f64;
    // Unlike speed, downtime includes the first sample: it is the share of all samples at speed 0.
    let downtime = samples.iter().filter(|s| s.speed == 0.0).count() as f64;

    let avg_daily = if totals.daily.is_empty() {
        0.0
    } else {
        totals.daily.values().sum::<f64>() / totals.daily.len() as f64
    };

    trace!(
        samples = samples.len(),
        days = totals.daily.len(),
        total_distance = totals.distance,
        "Aggregated samples"
    );

    DashboardMetrics {
        metros_percorridos: totals.distance.round(),
        media_metros_dia: avg_daily.round(),
        media_velocidade: round_to(totals.speed / n, 1),
        down_time_probability: round_to(downtime / n, 2),
        latest_position: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    fn still(speed: f64, hour: u32) -> Sample {
        Sample::new(-26.31832, -48.8702222, speed, at(1, hour))
    }

    #[test]
    fn test_empty_is_all_zero() {
        let metrics = aggregate(&[]);

        assert_eq!(metrics, DashboardMetrics::default());
        assert!(metrics.latest_position.is_none());
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let samples = vec![
            Sample::new(0.0, 0.0, 10.0, at(1, 0)),
            Sample::new(0.0, 1.0, 10.0, at(2, 0)),
        ];

        let metrics = aggregate(&samples);

        assert_eq!(metrics.metros_percorridos, 111_195.0);
    }

    #[test]
    fn test_downtime_counts_every_sample() {
        let samples = vec![still(0.0, 0), still(5.0, 1), still(0.0, 2), still(5.0, 3)];

        assert_eq!(aggregate(&samples).down_time_probability, 0.5);
    }

    #[test]
    fn test_speed_skips_first_sample_but_divides_by_all() {
        // pairwise speeds 5 + 0 + 5 over 4 samples
        let samples = vec![still(0.0, 0), still(5.0, 1), still(0.0, 2), still(5.0, 3)];

        assert_eq!(aggregate(&samples).media_velocidade, 2.5);
    }

    #[test]
    fn test_single_sample() {
        let moving = aggregate(&[still(7.5, 0)]);
        assert_eq!(moving.metros_percorridos, 0.0);
        assert_eq!(moving.media_metros_dia, 0.0);
        assert_eq!(moving.media_velocidade, 0.0);
        assert_eq!(moving.down_time_probability, 0.0);

        let stopped = aggregate(&[still(0.0, 0)]);
        assert_eq!(stopped.down_time_probability, 1.0);
    }

    #[test]
    fn test_two_days_single_pair_is_one_bucket() {
        let samples = vec![
            Sample::new(0.0, 0.0, 3.0, at(1, 23)),
            Sample::new(0.0, 0.5, 3.0, at(2, 1)),
        ];

        let metrics = aggregate(&samples);

        assert_eq!(metrics.metros_percorridos, 55_597.0);
        assert_eq!(metrics.media_metros_dia, metrics.metros_percorridos);
    }

    #[test]
    fn test_daily_average_over_observed_days() {
        let samples = vec![
            Sample::new(0.0, 0.0, 3.0, at(1, 8)),
            Sample::new(0.0, 1.0, 3.0, at(1, 9)),
            Sample::new(0.0, 1.5, 3.0, at(3, 9)),
        ];
        let d1 = haversine_distance(0.0, 0.0, 0.0, 1.0);
        let d2 = haversine_distance(0.0, 1.0, 0.0, 1.5);

        let metrics = aggregate(&samples);

        assert_eq!(metrics.metros_percorridos, (d1 + d2).round());
        assert_eq!(metrics.media_metros_dia, ((d1 + d2) / 2.0).round());
    }

    #[test]
    fn test_day_buckets_use_utc() {
        // 23:30 at -03:00 is already the next day in UTC
        let late = DateTime::parse_from_rfc3339("2024-05-01T23:30:00-03:00")
            .unwrap()
            .with_timezone(&Utc);
        let samples = vec![
            Sample::new(0.0, 0.0, 1.0, at(1, 20)),
            Sample::new(0.0, 0.1, 1.0, at(1, 21)),
            Sample::new(0.0, 0.2, 1.0, late),
        ];
        let step = haversine_distance(0.0, 0.0, 0.0, 0.1);

        let metrics = aggregate(&samples);

        // two buckets holding one step each
        assert_eq!(metrics.media_metros_dia, step.round());
    }

    #[test]
    fn test_is_deterministic() {
        let samples = vec![
            Sample::new(-26.31832, -48.8702222, 0.0, at(1, 0)),
            Sample::new(-26.3185919, -48.8619776, 12.4, at(1, 1)),
            Sample::new(-26.3185861, -48.8619871, 3.3, at(2, 1)),
        ];

        let a = aggregate(&samples);
        let b = aggregate(&samples);

        assert_eq!(a.metros_percorridos.to_bits(), b.metros_percorridos.to_bits());
        assert_eq!(a.media_metros_dia.to_bits(), b.media_metros_dia.to_bits());
        assert_eq!(a.media_velocidade.to_bits(), b.media_velocidade.to_bits());
        assert_eq!(
            a.down_time_probability.to_bits(),
            b.down_time_probability.to_bits()
        );
    }

    #[test]
    fn test_bounds_hold_for_mixed_input() {
        let samples: Vec<Sample> = (0..48)
            .map(|i| {
                let speed = if i % 3 == 0 { 0.0 } else { i as f64 };
                Sample::new(-26.0 - i as f64 * 0.01, -48.0, speed, at(1 + i / 24, i % 24))
            })
            .collect();

        let metrics = aggregate(&samples);

        assert!(metrics.metros_percorridos >= 0.0);
        assert!(metrics.media_metros_dia >= 0.0);
        assert!((0.0..=1.0).contains(&metrics.down_time_probability));
    }

    #[test]
    fn test_nan_coordinates_propagate() {
        let samples = vec![
            Sample::new(f64::NAN, 0.0, 1.0, at(1, 0)),
            Sample::new(0.0, 0.0, 1.0, at(1, 1)),
        ];

        let metrics = aggregate(&samples);

        assert!(metrics.metros_percorridos.is_nan());
        assert_eq!(metrics.media_velocidade, 0.5);
    }
}
