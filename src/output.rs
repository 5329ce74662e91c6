//! Output formatting and persistence for device metrics.
//!
//! Supports pretty-printing, JSON logging, and the dashboard CSV export.

use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeDelta, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::metrics::DashboardMetrics;

/// Time window a dashboard query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `days` days ending at `end`.
    pub fn last_days(end: DateTime<Utc>, days: i64) -> Result<Self> {
        let start = TimeDelta::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| anyhow!("Period of {days} days is out of range"))?;

        Ok(Self { start, end })
    }
}

/// Metrics of one device, as shown on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetrics {
    pub device_id: String,
    pub device_name: String,
    pub metrics: DashboardMetrics,
}

/// One line of the dashboard CSV export.
#[derive(Debug, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Device ID")]
    pub device_id: String,
    #[serde(rename = "Device Name")]
    pub device_name: String,
    #[serde(rename = "Metros Percorridos")]
    pub metros_percorridos: String,
    #[serde(rename = "Media de Metros/Dia")]
    pub media_metros_dia: String,
    #[serde(rename = "Media de Velocidade")]
    pub media_velocidade: String,
    #[serde(rename = "Probabilidade de Down Time (%)")]
    pub down_time_percent: String,
    #[serde(rename = "Periodo Inicio")]
    pub period_start: String,
    #[serde(rename = "Periodo Fim")]
    pub period_end: String,
}

impl ExportRow {
    pub fn new(device: &DeviceMetrics, period: &Period) -> Self {
        let m = &device.metrics;
        Self {
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            metros_percorridos: format_number(m.metros_percorridos),
            media_metros_dia: format_number(m.media_metros_dia),
            media_velocidade: format_number(m.media_velocidade),
            down_time_percent: format!("{:.2}", m.down_time_probability * 100.0),
            period_start: format_br_date(&period.start),
            period_end: format_br_date(&period.end),
        }
    }
}

/// Prints a number the way the dashboard shows it: `111195`, `2.5`, never `2.0`.
pub fn format_number(value: f64) -> String {
    if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        return format!("{sign}Infinity");
    }
    format!("{value}")
}

/// `DD/MM/YYYY`
pub fn format_br_date(dt: &DateTime<Utc>) -> String {
    dt.format("%d/%m/%Y").to_string()
}

/// Logs metrics using Rust's debug pretty-print format.
pub fn print_pretty(metrics: &DashboardMetrics) {
    debug!("{:#?}", metrics);
}

/// Logs metrics as pretty-printed JSON.
pub fn print_json(metrics: &DashboardMetrics) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(metrics)?);
    Ok(())
}

/// Writes the header and one row per device.
pub fn write_export<W: Write>(writer: W, devices: &[DeviceMetrics], period: &Period) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);

    for device in devices {
        writer.serialize(ExportRow::new(device, period))?;
    }
    writer.flush()?;

    Ok(())
}

pub fn export_file_name(period: &Period) -> String {
    format!(
        "boia_dashboard_{}_{}.csv",
        period.start.format("%d-%m-%Y"),
        period.end.format("%d-%m-%Y")
    )
}

/// Writes the dashboard export into `dir` and returns the file path.
pub fn export_to_file(dir: &Path, devices: &[DeviceMetrics], period: &Period) -> Result<PathBuf> {
    if devices.is_empty() {
        return Err(anyhow!("No data available to export"));
    }

    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(period));
    debug!(path = %path.display(), rows = devices.len(), "Writing CSV export");

    write_export(File::create(&path)?, devices, period)?;

    Ok(path)
}
