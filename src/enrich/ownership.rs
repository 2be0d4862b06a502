//! Ownership chain resolution (spec §4.6 "Ownership" — the special
//! enricher that runs before the rest of the pipeline, because aggregation
//! depends on its output). Takes the replica-set store snapshot as an
//! extra input rather than being a plain `Enricher`, since replica sets are
//! never part of the emitted snapshot (spec §3 "internal only").

use std::collections::HashMap;

use crate::model::{OwnerRef, Pod, ReplicaSet};

const MAX_DEPTH: u32 = 10;

/// Rewrites each pod's owner fields in place to point at its top-level
/// controller, walking `RS -> (Deployment | Rollout | ...)` up to
/// `MAX_DEPTH` hops. Terminates on any input, including cycles, because the
/// walk is depth-bounded rather than cycle-detected (spec §9 "no cycle
/// detection set is required").
pub fn resolve(pods: &mut [Pod], replica_sets: &[ReplicaSet]) {
    let by_key: HashMap<(&str, &str), &ReplicaSet> =
        replica_sets.iter().map(|rs| ((rs.namespace.as_str(), rs.name.as_str()), rs)).collect();

    for pod in pods.iter_mut() {
        if pod.owner_kind == "Node" {
            // Static pod — leave unchanged.
            continue;
        }
        if pod.owner_kind.is_empty() {
            // Orphan — leave unchanged (already empty).
            continue;
        }

        if pod.owner_kind == "ReplicaSet" {
            let resolved = walk_replica_set(&pod.owner_name, &pod.namespace, &by_key);
            if let Some(top) = resolved {
                pod.set_owner(top);
            }
            // If unresolved (parent not present in store), leave the
            // original ReplicaSet reference untouched.
        } else if pod.owner_kind == "Job" {
            if let Some(cron) = pod.owner_cron_job.take() {
                if !cron.is_empty() {
                    pod.set_owner(OwnerRef {
                        kind: "CronJob".to_string(),
                        name: cron,
                        uid: None,
                    });
                }
            }
        }
    }
}

/// Returns `Some(owner)` only once the walk reaches a non-`ReplicaSet`
/// owner or a `ReplicaSet` whose own parent isn't present in the store
/// (standalone RS — spec: "Never change Owner if the parent is not
/// present"). If the depth cap is hit first (a cycle, or a chain longer
/// than `MAX_DEPTH`), returns `None` so the caller leaves the pod's
/// original reference untouched rather than rewriting it to some
/// arbitrary mid-chain `ReplicaSet`.
fn walk_replica_set(
    start_name: &str,
    namespace: &str,
    by_key: &HashMap<(&str, &str), &ReplicaSet>,
) -> Option<OwnerRef> {
    let mut current = by_key.get(&(namespace, start_name)).copied()?;

    for _ in 0..MAX_DEPTH {
        if current.owner_kind != "ReplicaSet" {
            return Some(current.owner());
        }
        match by_key.get(&(namespace, current.owner_name.as_str())) {
            Some(next) => current = next,
            None => return Some(current.owner()),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rs(name: &str, namespace: &str, owner_kind: &str, owner_name: &str) -> ReplicaSet {
        ReplicaSet {
            uid: format!("uid-{name}"),
            name: name.to_string(),
            namespace: namespace.to_string(),
            owner_kind: owner_kind.to_string(),
            owner_name: owner_name.to_string(),
            owner_uid: None,
        }
    }

    fn pod_owned_by(owner_kind: &str, owner_name: &str) -> Pod {
        Pod {
            namespace: "default".to_string(),
            owner_kind: owner_kind.to_string(),
            owner_name: owner_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_replicaset_to_deployment() {
        let replica_sets = vec![rs("rs-1", "default", "Deployment", "d1")];
        let mut pods = vec![pod_owned_by("ReplicaSet", "rs-1")];
        resolve(&mut pods, &replica_sets);
        assert_eq!(pods[0].owner_kind, "Deployment");
        assert_eq!(pods[0].owner_name, "d1");
    }

    #[test]
    fn leaves_standalone_replicaset_unresolved() {
        let replica_sets = vec![];
        let mut pods = vec![pod_owned_by("ReplicaSet", "rs-orphan")];
        resolve(&mut pods, &replica_sets);
        assert_eq!(pods[0].owner_kind, "ReplicaSet");
        assert_eq!(pods[0].owner_name, "rs-orphan");
    }

    #[test]
    fn terminates_on_cyclic_replicaset_chain() {
        let replica_sets = vec![
            rs("rs-a", "default", "ReplicaSet", "rs-b"),
            rs("rs-b", "default", "ReplicaSet", "rs-a"),
        ];
        let mut pods = vec![pod_owned_by("ReplicaSet", "rs-a")];
        // Must return promptly rather than loop forever, and must not
        // rewrite the owner to some arbitrary mid-cycle ReplicaSet.
        resolve(&mut pods, &replica_sets);
        assert_eq!(pods[0].owner_kind, "ReplicaSet");
        assert_eq!(pods[0].owner_name, "rs-a");
    }

    #[test]
    fn promotes_job_to_cronjob() {
        let mut pod = pod_owned_by("Job", "nightly-job-123");
        pod.owner_cron_job = Some("nightly".to_string());
        let mut pods = vec![pod];
        resolve(&mut pods, &[]);
        assert_eq!(pods[0].owner_kind, "CronJob");
        assert_eq!(pods[0].owner_name, "nightly");
    }

    #[test]
    fn static_pod_owner_untouched() {
        let mut pods = vec![pod_owned_by("Node", "node-1")];
        resolve(&mut pods, &[]);
        assert_eq!(pods[0].owner_kind, "Node");
    }
}
