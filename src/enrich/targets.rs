//! Workload-to-PDB/Service target matching (spec §4.6 "Targets"): a
//! workload is a target iff every `(k,v)` in the PDB/Service selector is
//! present in the workload's own selector (superset match) and they share
//! a namespace.

use std::collections::BTreeMap;

use crate::model::{ClusterSnapshot, WorkloadRef};

use super::Enricher;

pub struct TargetsEnricher;

impl Enricher for TargetsEnricher {
    fn name(&self) -> &'static str {
        "targets"
    }

    fn enrich(&self, snapshot: &mut ClusterSnapshot) {
        let workloads: Vec<WorkloadEntry> = snapshot
            .deployments
            .iter()
            .map(|d| WorkloadEntry::new("Deployment", &d.name, &d.namespace, &d.selector))
            .chain(
                snapshot
                    .stateful_sets
                    .iter()
                    .map(|s| WorkloadEntry::new("StatefulSet", &s.name, &s.namespace, &s.selector)),
            )
            .chain(
                snapshot
                    .daemon_sets
                    .iter()
                    .map(|ds| WorkloadEntry::new("DaemonSet", &ds.name, &ds.namespace, &ds.selector)),
            )
            .collect();

        for pdb in &mut snapshot.pdbs {
            pdb.target_workloads = matching_targets(&workloads, &pdb.namespace, &pdb.match_labels);
        }
        for svc in &mut snapshot.services {
            svc.target_workloads = matching_targets(&workloads, &svc.namespace, &svc.selector);
        }
    }
}

struct WorkloadEntry {
    kind: &'static str,
    name: String,
    namespace: String,
    selector: BTreeMap<String, String>,
}

impl WorkloadEntry {
    fn new(kind: &'static str, name: &str, namespace: &str, selector: &BTreeMap<String, String>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            selector: selector.clone(),
        }
    }
}

fn matching_targets(
    workloads: &[WorkloadEntry],
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Vec<WorkloadRef> {
    if selector.is_empty() {
        return Vec::new();
    }
    workloads
        .iter()
        .filter(|w| w.namespace == namespace)
        .filter(|w| is_superset(&w.selector, selector))
        .map(|w| WorkloadRef {
            kind: w.kind.to_string(),
            name: w.name.clone(),
            namespace: w.namespace.clone(),
        })
        .collect()
}

fn is_superset(workload_selector: &BTreeMap<String, String>, target_selector: &BTreeMap<String, String>) -> bool {
    target_selector.iter().all(|(k, v)| workload_selector.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Deployment, Pdb};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn pdb_matches_deployment_by_selector_superset() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.deployments.push(Deployment {
            name: "web".into(),
            namespace: "default".into(),
            selector: labels(&[("app", "web"), ("tier", "frontend")]),
            ..Default::default()
        });
        snapshot.pdbs.push(Pdb {
            name: "web-pdb".into(),
            namespace: "default".into(),
            match_labels: labels(&[("app", "web")]),
            ..Default::default()
        });

        TargetsEnricher.enrich(&mut snapshot);

        assert_eq!(snapshot.pdbs[0].target_workloads.len(), 1);
        assert_eq!(snapshot.pdbs[0].target_workloads[0].name, "web");
    }

    #[test]
    fn no_match_across_namespaces() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.deployments.push(Deployment {
            name: "web".into(),
            namespace: "other".into(),
            selector: labels(&[("app", "web")]),
            ..Default::default()
        });
        snapshot.pdbs.push(Pdb {
            name: "web-pdb".into(),
            namespace: "default".into(),
            match_labels: labels(&[("app", "web")]),
            ..Default::default()
        });

        TargetsEnricher.enrich(&mut snapshot);
        assert!(snapshot.pdbs[0].target_workloads.is_empty());
    }

    #[test]
    fn empty_selector_targets_nothing() {
        let mut snapshot = ClusterSnapshot::new_empty("c1".into(), "v0".into());
        snapshot.deployments.push(Deployment {
            name: "web".into(),
            namespace: "default".into(),
            selector: labels(&[("app", "web")]),
            ..Default::default()
        });
        snapshot.pdbs.push(Pdb {
            name: "catch-all".into(),
            namespace: "default".into(),
            ..Default::default()
        });

        TargetsEnricher.enrich(&mut snapshot);
        assert!(snapshot.pdbs[0].target_workloads.is_empty());
    }
}
