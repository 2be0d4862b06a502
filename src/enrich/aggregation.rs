//! Per-workload resource aggregation (spec §4.6 "Aggregation").

use std::collections::HashMap;

use crate::model::{ClusterSnapshot, Pod, ResourceAmount, WorkloadTotals};

use super::Enricher;

pub struct AggregationEnricher;

impl Enricher for AggregationEnricher {
    fn name(&self) -> &'static str {
        "aggregation"
    }

    fn enrich(&self, snapshot: &mut ClusterSnapshot) {
        let mut by_owner: HashMap<(&str, &str, &str), Vec<&Pod>> = HashMap::new();
        for pod in &snapshot.pods {
            if pod.owner_kind.is_empty() {
                continue;
            }
            by_owner
                .entry((pod.namespace.as_str(), pod.owner_kind.as_str(), pod.owner_name.as_str()))
                .or_default()
                .push(pod);
        }

        for d in &mut snapshot.deployments {
            d.totals = Some(totals_for(&by_owner, &d.namespace, "Deployment", &d.name, true));
        }
        for s in &mut snapshot.stateful_sets {
            s.totals = Some(totals_for(&by_owner, &s.namespace, "StatefulSet", &s.name, true));
        }
        for ds in &mut snapshot.daemon_sets {
            ds.totals = Some(totals_for(&by_owner, &ds.namespace, "DaemonSet", &ds.name, true));
        }
        for job in &mut snapshot.jobs {
            // Jobs aggregate requests and usage only — no limit totals.
            job.totals = Some(totals_for(&by_owner, &job.namespace, "Job", &job.name, false));
        }
    }
}

fn totals_for<'a>(
    by_owner: &HashMap<(&'a str, &'a str, &'a str), Vec<&'a Pod>>,
    namespace: &str,
    owner_kind: &str,
    owner_name: &str,
    include_limits: bool,
) -> WorkloadTotals {
    let Some(pods) = by_owner.get(&(namespace, owner_kind, owner_name)) else {
        return WorkloadTotals::default();
    };

    let mut requests = ResourceAmount::default();
    let mut limits = ResourceAmount::default();
    let mut usage = ResourceAmount::default();
    let mut any_usage = false;
    let mut any_limits = false;

    for pod in pods.iter() {
        for c in &pod.containers {
            requests = requests.add(&ResourceAmount {
                cpu_cores: c.cpu_request_cores,
                memory_bytes: c.memory_request_bytes,
            });
            if include_limits && (c.cpu_limit_cores.is_some() || c.memory_limit_bytes.is_some()) {
                any_limits = true;
                limits = limits.add(&ResourceAmount {
                    cpu_cores: c.cpu_limit_cores,
                    memory_bytes: c.memory_limit_bytes,
                });
            }
            if c.cpu_usage_cores.is_some() || c.memory_usage_bytes.is_some() {
                any_usage = true;
                usage = usage.add(&ResourceAmount {
                    cpu_cores: c.cpu_usage_cores,
                    memory_bytes: c.memory_usage_bytes,
                });
            }
        }
    }

    WorkloadTotals {
        requests,
        limits: (include_limits && any_limits).then_some(limits),
        usage: any_usage.then_some(usage),
        pod_count: pods.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Container;

    fn container(cpu_req: f64, mem_req: u64) -> Container {
        Container {
            cpu_request_cores: Some(cpu_req),
            memory_request_bytes: Some(mem_req),
            ..Default::default()
        }
    }

    #[test]
    fn sums_requests_across_matched_pods() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.deployments.push(crate::model::Deployment {
            namespace: "default".into(),
            name: "web".into(),
            ..Default::default()
        });
        snapshot.pods.push(Pod {
            namespace: "default".into(),
            owner_kind: "Deployment".into(),
            owner_name: "web".into(),
            containers: vec![container(0.5, 500_000_000)],
            ..Default::default()
        });
        snapshot.pods.push(Pod {
            namespace: "default".into(),
            owner_kind: "Deployment".into(),
            owner_name: "web".into(),
            containers: vec![container(0.25, 250_000_000)],
            ..Default::default()
        });

        AggregationEnricher.enrich(&mut snapshot);

        let totals = snapshot.deployments[0].totals.as_ref().unwrap();
        assert_eq!(totals.requests.cpu_cores, Some(0.75));
        assert_eq!(totals.requests.memory_bytes, Some(750_000_000));
        assert_eq!(totals.pod_count, 2);
        assert!(totals.usage.is_none());
    }

    #[test]
    fn usage_total_is_null_when_no_container_reports_usage() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.jobs.push(crate::model::Job {
            namespace: "default".into(),
            name: "batch".into(),
            ..Default::default()
        });
        snapshot.pods.push(Pod {
            namespace: "default".into(),
            owner_kind: "Job".into(),
            owner_name: "batch".into(),
            containers: vec![container(1.0, 1_000_000)],
            ..Default::default()
        });

        AggregationEnricher.enrich(&mut snapshot);

        let totals = snapshot.jobs[0].totals.as_ref().unwrap();
        assert!(totals.usage.is_none());
        assert!(totals.limits.is_none());
    }
}
