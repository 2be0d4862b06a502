//! `Summary` computation (spec §4.8) — pure arithmetic over an already
//! fully-merged, fully-enriched snapshot.

use crate::model::{ClusterSnapshot, Summary};

pub fn compute(snapshot: &ClusterSnapshot) -> Summary {
    let node_count = snapshot.nodes.len();
    let pod_count = snapshot.pods.len();
    let mut running_pod_count = 0;
    let mut pending_pod_count = 0;
    let mut failed_pod_count = 0;
    let mut container_count = 0;

    for pod in &snapshot.pods {
        match pod.phase.as_str() {
            "Running" => running_pod_count += 1,
            "Pending" => pending_pod_count += 1,
            "Failed" => failed_pod_count += 1,
            _ => {}
        }
        container_count += pod.containers.len();
    }

    let mut cpu_capacity_cores = 0.0;
    let mut memory_capacity_bytes = 0u64;
    let mut cpu_allocatable_cores = 0.0;
    let mut memory_allocatable_bytes = 0u64;
    let mut total_cpu_usage_cores = 0.0;
    let mut total_memory_usage_bytes = 0u64;
    let mut metrics_available = false;

    let mut total_gpu_usage_percent = 0.0;
    let mut gpu_node_sample_count = 0usize;
    let mut total_gpu_tensor_active_percent = 0.0;
    let mut gpu_tensor_sample_count = 0usize;
    let mut total_gpu_memory_used_bytes = 0u64;
    let mut total_gpu_memory_total_bytes = 0u64;
    let mut gpu_metrics_available = false;

    for node in &snapshot.nodes {
        cpu_capacity_cores += node.cpu_capacity_cores;
        memory_capacity_bytes += node.memory_capacity_bytes;
        cpu_allocatable_cores += node.cpu_allocatable_cores;
        memory_allocatable_bytes += node.memory_allocatable_bytes;

        if let Some(cpu) = node.cpu_usage_cores {
            metrics_available = true;
            total_cpu_usage_cores += cpu;
        }
        if let Some(mem) = node.memory_usage_bytes {
            total_memory_usage_bytes += mem;
        }

        if let Some(util) = node.gpu_utilization_percent {
            gpu_metrics_available = true;
            total_gpu_usage_percent += util;
            gpu_node_sample_count += 1;
        }
        if let Some(tensor) = node.gpu_tensor_active_percent {
            total_gpu_tensor_active_percent += tensor;
            gpu_tensor_sample_count += 1;
        }
        if let Some(used) = node.gpu_memory_used_bytes {
            total_gpu_memory_used_bytes += used;
        }
        if let Some(total) = node.gpu_memory_total_bytes {
            total_gpu_memory_total_bytes += total;
        }
    }

    let mut total_cpu_requested_cores = 0.0;
    let mut total_memory_requested_bytes = 0u64;
    for pod in &snapshot.pods {
        for c in &pod.containers {
            total_cpu_requested_cores += c.cpu_request_cores.unwrap_or(0.0);
            total_memory_requested_bytes += c.memory_request_bytes.unwrap_or(0);
        }
    }

    let pv_capacity_bytes = snapshot.persistent_volumes.iter().map(|pv| pv.capacity_bytes).sum();
    let pvc_requested_bytes = snapshot
        .persistent_volume_claims
        .iter()
        .map(|pvc| pvc.requested_bytes)
        .sum();

    Summary {
        node_count,
        pod_count,
        running_pod_count,
        pending_pod_count,
        failed_pod_count,
        container_count,
        namespace_count: snapshot.namespaces.len(),
        deployment_count: snapshot.deployments.len(),
        stateful_set_count: snapshot.stateful_sets.len(),
        daemon_set_count: snapshot.daemon_sets.len(),
        job_count: snapshot.jobs.len(),
        cron_job_count: snapshot.cron_jobs.len(),

        cpu_capacity_cores,
        memory_capacity_bytes,
        cpu_allocatable_cores,
        memory_allocatable_bytes,
        total_cpu_requested_cores,
        total_memory_requested_bytes,

        metrics_available,
        total_cpu_usage_cores: metrics_available.then_some(total_cpu_usage_cores),
        total_memory_usage_bytes: metrics_available.then_some(total_memory_usage_bytes),

        gpu_metrics_available,
        total_gpu_usage_percent: gpu_metrics_available.then_some(total_gpu_usage_percent / gpu_node_sample_count.max(1) as f64),
        total_gpu_tensor_active_percent: (gpu_tensor_sample_count > 0)
            .then_some(total_gpu_tensor_active_percent / gpu_tensor_sample_count.max(1) as f64),
        total_gpu_memory_used_bytes: gpu_metrics_available.then_some(total_gpu_memory_used_bytes),
        total_gpu_memory_total_bytes: gpu_metrics_available.then_some(total_gpu_memory_total_bytes),

        pv_capacity_bytes,
        pvc_requested_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Container, Node, Pod};

    #[test]
    fn happy_path_scenario_from_spec() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.nodes.push(Node {
            name: "n1".into(),
            cpu_capacity_cores: 4.0,
            memory_capacity_bytes: 8 * (1 << 30),
            ..Default::default()
        });
        snapshot.pods.push(Pod {
            namespace: "default".into(),
            name: "p1".into(),
            phase: "Running".into(),
            containers: vec![Container {
                name: "c1".into(),
                cpu_request_cores: Some(0.5),
                memory_request_bytes: Some(500_000_000),
                ..Default::default()
            }],
            ..Default::default()
        });

        let summary = compute(&snapshot);
        assert_eq!(summary.node_count, 1);
        assert_eq!(summary.pod_count, 1);
        assert_eq!(summary.running_pod_count, 1);
        assert_eq!(summary.total_cpu_requested_cores, 0.5);
        assert_eq!(summary.total_memory_requested_bytes, 500_000_000);
        assert!(!summary.metrics_available);
        assert!(summary.total_cpu_usage_cores.is_none());
    }

    #[test]
    fn metrics_merge_scenario_from_spec() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.nodes.push(Node {
            name: "n1".into(),
            cpu_usage_cores: Some(1.5),
            memory_usage_bytes: Some(4 * (1 << 30)),
            ..Default::default()
        });

        let summary = compute(&snapshot);
        assert!(summary.metrics_available);
        assert_eq!(summary.total_cpu_usage_cores, Some(1.5));
    }
}
