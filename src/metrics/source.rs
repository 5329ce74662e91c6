use crate::metrics::aggregate::aggregate;
use crate::metrics::types::{DashboardMetrics, Sample};

/// Where a device's metrics come from.
///
/// The backend either returns the raw position samples, which are aggregated
/// locally, or a summary it already aggregated, which is used as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsSource {
    RawSamples(Vec<Sample>),
    PrecomputedSummary(DashboardMetrics),
}

impl MetricsSource {
    /// Stand-in for a device with no recorded data.
    pub fn empty() -> Self {
        MetricsSource::PrecomputedSummary(DashboardMetrics::default())
    }

    pub fn resolve(self) -> DashboardMetrics {
        match self {
            MetricsSource::RawSamples(samples) => aggregate(&samples),
            MetricsSource::PrecomputedSummary(metrics) => metrics,
        }
    }
}
