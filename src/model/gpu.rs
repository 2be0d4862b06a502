//! GPU telemetry samples (spec §3, §4.7).
//!
//! Samples are scraped from a DCGM-exporter-compatible Prometheus endpoint.
//! DCGM represents "no reading" with a sentinel value (glossary: "a
//! provider-specific out-of-band marker ... here, 'very large ≈ 1.8e19'"),
//! which [`normalize_sentinel`] turns into `None`.

use serde::{Deserialize, Serialize};

/// DCGM's "field not supported" sentinel. Any sample magnitude at or above
/// this is treated as "no reading", not as a real value.
pub const DCGM_SENTINEL_THRESHOLD: f64 = 1.0e18;

pub fn normalize_sentinel(value: f64) -> Option<f64> {
    if value.is_finite() && value.abs() < DCGM_SENTINEL_THRESHOLD {
        Some(value)
    } else {
        None
    }
}

/// A single per-device GPU sample, as attributed to a node and (if
/// workload-scoped) a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuSample {
    pub uuid: String,
    pub device_index: u32,
    pub model: String,
    pub driver_version: String,

    pub hostname: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub pod: String,
    #[serde(default)]
    pub container: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tensor_active_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_copy_util_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_free_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_watts: Option<f64>,
    #[serde(default)]
    pub mig_enabled: bool,
}

impl GpuSample {
    /// `true` if this sample carries pod/container attribution, i.e. it can
    /// be merged onto a `Container` rather than only onto a `Node`.
    pub fn has_workload_attribution(&self) -> bool {
        !self.namespace.is_empty() && !self.pod.is_empty() && !self.container.is_empty()
    }
}

/// Per-device record attached to a `Node` once it is matched by hostname
/// (spec §4.7 step 5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuDeviceInfo {
    pub uuid: String,
    pub device_index: u32,
    pub model: String,
    pub driver_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tensor_active_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_watts: Option<f64>,
    #[serde(default)]
    pub mig_enabled: bool,
}

impl From<&GpuSample> for GpuDeviceInfo {
    fn from(s: &GpuSample) -> Self {
        GpuDeviceInfo {
            uuid: s.uuid.clone(),
            device_index: s.device_index,
            model: s.model.clone(),
            driver_version: s.driver_version.clone(),
            utilization_percent: s.utilization_percent,
            tensor_active_percent: s.tensor_active_percent,
            memory_used_bytes: s.memory_used_bytes,
            memory_total_bytes: s.memory_total_bytes,
            temperature_celsius: s.temperature_celsius,
            power_watts: s.power_watts,
            mig_enabled: s.mig_enabled,
        }
    }
}
