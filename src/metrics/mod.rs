//! Travel metrics for tracked devices.
//!
//! Turns a device's raw position samples into a [`DashboardMetrics`] summary:
//! total distance (Haversine), average distance per observed day, average
//! speed and the probability of the device being stopped.

pub mod aggregate;
pub mod haversine;
pub mod source;
pub mod types;

pub use aggregate::aggregate;
pub use haversine::haversine_distance;
pub use source::MetricsSource;
pub use types::{DashboardMetrics, LatestPosition, Sample};
