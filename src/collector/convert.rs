//! Shared conversions from k8s-openapi wire types to our domain model.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::model::{Container, OwnerRef};

/// Parses a Kubernetes resource `Quantity` CPU value into fractional cores.
/// `"500m"` → `0.5`, `"2"` → `2.0`. Unparseable values are treated as
/// absent rather than panicking — a malformed spec field must not crash the
/// collector (spec §4.3 "Failure semantics").
pub fn cpu_cores(q: Option<&Quantity>) -> Option<f64> {
    let raw = &q?.0;
    if let Some(milli) = raw.strip_suffix('m') {
        milli.parse::<f64>().ok().map(|m| m / 1000.0)
    } else {
        raw.parse::<f64>().ok()
    }
}

/// Parses a Kubernetes resource `Quantity` memory value into bytes,
/// accepting the binary (`Ki`, `Mi`, `Gi`, `Ti`) and decimal (`k`, `M`, `G`,
/// `T`) SI suffixes.
pub fn memory_bytes(q: Option<&Quantity>) -> Option<u64> {
    let raw = &q?.0;
    const BINARY: &[(&str, u64)] = &[
        ("Ki", 1u64 << 10),
        ("Mi", 1u64 << 20),
        ("Gi", 1u64 << 30),
        ("Ti", 1u64 << 40),
        ("Pi", 1u64 << 50),
    ];
    const DECIMAL: &[(&str, u64)] = &[
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];
    for (suffix, multiplier) in BINARY {
        if let Some(num) = raw.strip_suffix(suffix) {
            return num.parse::<f64>().ok().map(|n| (n * *multiplier as f64) as u64);
        }
    }
    for (suffix, multiplier) in DECIMAL {
        if let Some(num) = raw.strip_suffix(suffix) {
            return num.parse::<f64>().ok().map(|n| (n * *multiplier as f64) as u64);
        }
    }
    raw.parse::<f64>().ok().map(|n| n as u64)
}

pub fn labels_map(labels: &std::collections::BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels.clone()
}

/// The first owner reference on an object, or an empty `OwnerRef` if it has
/// none (orphan — spec §4.6 "Ownership").
pub fn first_owner(owners: &[OwnerReference]) -> OwnerRef {
    match owners.first() {
        Some(o) => OwnerRef {
            kind: o.kind.clone(),
            name: o.name.clone(),
            uid: Some(o.uid.clone()),
        },
        None => OwnerRef::default(),
    }
}

pub fn container_from_spec(
    c: &k8s_openapi::api::core::v1::Container,
    status: Option<&k8s_openapi::api::core::v1::ContainerStatus>,
) -> Container {
    let requests = c.resources.as_ref().and_then(|r| r.requests.as_ref());
    let limits = c.resources.as_ref().and_then(|r| r.limits.as_ref());

    Container {
        name: c.name.clone(),
        image: c.image.clone().unwrap_or_default(),
        ready: status.map(|s| s.ready).unwrap_or(false),
        restart_count: status.map(|s| s.restart_count).unwrap_or(0),
        state: status
            .and_then(|s| s.state.as_ref())
            .map(|state| {
                if state.running.is_some() {
                    "running".to_string()
                } else if state.waiting.is_some() {
                    "waiting".to_string()
                } else if state.terminated.is_some() {
                    "terminated".to_string()
                } else {
                    "unknown".to_string()
                }
            }),
        cpu_request_cores: cpu_cores(requests.and_then(|r| r.get("cpu"))),
        memory_request_bytes: memory_bytes(requests.and_then(|r| r.get("memory"))),
        cpu_limit_cores: cpu_cores(limits.and_then(|r| r.get("cpu"))),
        memory_limit_bytes: memory_bytes(limits.and_then(|r| r.get("memory"))),
        cpu_usage_cores: None,
        memory_usage_bytes: None,
        gpu_utilization_percent: None,
        gpu_memory_used_bytes: None,
    }
}

pub fn object_uid<K: ResourceExt>(obj: &K) -> String {
    obj.uid().unwrap_or_default()
}

/// Renders a PDB `minAvailable`/`maxUnavailable` `IntOrString` the way it
/// appears on the wire — `"2"` or `"50%"` — rather than its Debug form.
pub fn int_or_string(v: &k8s_openapi::apimachinery::pkg::util::intstr::IntOrString) -> String {
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    match v {
        IntOrString::Int(i) => i.to_string(),
        IntOrString::String(s) => s.clone(),
    }
}
