//! Per-device refreshes driving the metrics core: the dashboard (all devices,
//! one period, concurrently) and the map (latest position of every device).

use boia_dashboard::metrics::DashboardMetrics;
use boia_dashboard::output::{DeviceMetrics, Period};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info};

use crate::services::device_api::{Device, DeviceApi};

/// Where a device was last seen, for the map view.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceLocation {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// average speed over the reported data, km/h
    pub speed: f64,
    pub last_update: String,
}

/// Fetches and resolves metrics for every device, at most `concurrency` at a time.
///
/// Results keep the order of `devices`. A device whose fetch fails is logged
/// and reported with zero metrics.
#[tracing::instrument(skip_all, fields(devices = devices.len(), concurrency = concurrency))]
pub async fn collect_dashboard<A>(
    api: Arc<A>,
    devices: &[Device],
    period: Period,
    concurrency: usize,
) -> Vec<DeviceMetrics>
where
    A: DeviceApi + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(devices.len());

    for device in devices {
        let api = api.clone();
        let sem = semaphore.clone();
        let device_id = device.id.clone();

        let span = tracing::info_span!("device", device_id = %device.id, device_name = %device.name);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;
                let source = api.device_metrics(&device_id, Some(&period)).await?;
                Ok::<_, anyhow::Error>(source.resolve())
            }
            .instrument(span),
        );
        tasks.push(task);
    }

    let mut results = Vec::with_capacity(devices.len());
    for (device, task) in devices.iter().zip(tasks) {
        let metrics = match task.await {
            Ok(Ok(metrics)) => {
                debug!(device_id = %device.id, "Device metrics resolved");
                metrics
            }
            Ok(Err(e)) => {
                error!(device_id = %device.id, error = %e, "Failed to fetch device metrics");
                DashboardMetrics::default()
            }
            Err(e) => {
                error!(device_id = %device.id, error = %e, "Device metrics task aborted");
                DashboardMetrics::default()
            }
        };

        results.push(DeviceMetrics {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            metrics,
        });
    }

    info!(devices = results.len(), "Dashboard refreshed");
    results
}

/// Latest known position of each device that reports one.
///
/// Devices are queried one after another; failures are logged and skipped.
#[tracing::instrument(skip_all, fields(devices = devices.len()))]
pub async fn latest_locations<A: DeviceApi + ?Sized>(
    api: &A,
    devices: &[Device],
) -> Vec<DeviceLocation> {
    let mut locations = Vec::new();

    for device in devices {
        let metrics = match api.device_metrics(&device.id, None).await {
            Ok(source) => source.resolve(),
            Err(e) => {
                error!(device_id = %device.id, error = %e, "Failed to fetch device location");
                continue;
            }
        };

        if let Some(pos) = metrics.latest_position {
            locations.push(DeviceLocation {
                id: device.id.clone(),
                name: device.name.clone(),
                latitude: pos.latitude,
                longitude: pos.longitude,
                speed: metrics.media_velocidade,
                last_update: pos.datetime,
            });
        }
    }

    locations
}
