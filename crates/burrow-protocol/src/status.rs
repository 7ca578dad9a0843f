//! `/rest/status` document.

use burrow_core::metrics::{HistogramSnapshot, MeterSnapshot};
use burrow_core::status::{ConnectionStatus, StatusSource, TunnelInfo};
use serde::{Deserialize, Serialize};

/// Wire: `{ "count": 3, "1m.rate": 0.2, "5m.rate": ..., "15m.rate": ..., "mean.rate": ... }`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterSummary {
    pub count: u64,
    #[serde(rename = "1m.rate")]
    pub rate1: f64,
    #[serde(rename = "5m.rate")]
    pub rate5: f64,
    #[serde(rename = "15m.rate")]
    pub rate15: f64,
    #[serde(rename = "mean.rate")]
    pub rate_mean: f64,
}

impl From<MeterSnapshot> for MeterSummary {
    fn from(m: MeterSnapshot) -> Self {
        Self {
            count: m.count,
            rate1: m.rate1,
            rate5: m.rate5,
            rate15: m.rate15,
            rate_mean: m.rate_mean,
        }
    }
}

/// Wire: `{ "count", "min", "max", "mean", "stddev", "median", "p75", "p95", "p99", "p99.9" }`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    #[serde(rename = "p99.9")]
    pub p999: f64,
}

impl From<HistogramSnapshot> for HistogramSummary {
    fn from(h: HistogramSnapshot) -> Self {
        Self {
            count: h.count,
            min: h.min,
            max: h.max,
            mean: h.mean,
            stddev: h.stddev,
            median: h.median,
            p75: h.p75,
            p95: h.p95,
            p99: h.p99,
            p999: h.p999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub tunnels: Vec<TunnelInfo>,
    pub client_version: String,
    pub server_version: String,
    pub connection_status: ConnectionStatus,
    pub connection_metrics: MeterSummary,
    pub bytes_in: HistogramSummary,
    pub bytes_out: HistogramSummary,
}

impl StatusDocument {
    /// Gather a point-in-time document from `source`.
    pub fn snapshot(source: &dyn StatusSource) -> Self {
        Self {
            tunnels: source.tunnels(),
            client_version: source.client_version(),
            server_version: source.server_version(),
            connection_status: source.connection_status(),
            connection_metrics: source.connection_metrics().into(),
            bytes_in: source.bytes_in().into(),
            bytes_out: source.bytes_out().into(),
        }
    }
}
